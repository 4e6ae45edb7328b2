diesel::table! {
    users (id) {
        id -> Uuid,
        email -> Text,
        display_name -> Text,
        password_hash -> Text,
        phone -> Nullable<Text>,
        is_active -> Bool,
        is_admin -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    pipelines (id) {
        id -> Uuid,
        name -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    pipeline_stages (id) {
        id -> Uuid,
        pipeline_id -> Uuid,
        name -> Text,
        position -> Int4,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    leads (id) {
        id -> Uuid,
        title -> Text,
        contact_name -> Nullable<Text>,
        email -> Nullable<Text>,
        phone -> Nullable<Text>,
        status -> Text,
        pipeline_id -> Nullable<Uuid>,
        stage_id -> Nullable<Uuid>,
        owner_user_id -> Nullable<Uuid>,
        property_id -> Nullable<Uuid>,
        source -> Nullable<Text>,
        message -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        closed_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    lead_stage_changes (id) {
        id -> Uuid,
        lead_id -> Uuid,
        from_stage_id -> Nullable<Uuid>,
        to_stage_id -> Uuid,
        changed_by -> Nullable<Uuid>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    lead_notes (id) {
        id -> Uuid,
        lead_id -> Uuid,
        author_id -> Nullable<Uuid>,
        content -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    portal_webhook_events (id) {
        id -> Uuid,
        provider -> Text,
        external_event_id -> Nullable<Text>,
        idempotency_key -> Text,
        status -> Text,
        payload -> Jsonb,
        lead_id -> Nullable<Uuid>,
        error_message -> Nullable<Text>,
        received_at -> Timestamptz,
        processed_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    properties (id) {
        id -> Uuid,
        title -> Text,
        description -> Nullable<Text>,
        address -> Nullable<Text>,
        city -> Nullable<Text>,
        price -> Nullable<Float8>,
        currency -> Nullable<Text>,
        listing_type -> Text,
        status -> Text,
        features -> Array<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    feature_aliases (id) {
        id -> Uuid,
        alias -> Text,
        canonical -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    campaign_tasks (id) {
        id -> Uuid,
        campaign -> Text,
        property_id -> Nullable<Uuid>,
        title -> Text,
        due_date -> Nullable<Date>,
        done_at -> Nullable<Timestamptz>,
        assignee_id -> Nullable<Uuid>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    documents (id) {
        id -> Uuid,
        file_name -> Text,
        object_key -> Text,
        content_type -> Text,
        size_bytes -> Int8,
        property_id -> Nullable<Uuid>,
        lead_id -> Nullable<Uuid>,
        uploaded_by -> Nullable<Uuid>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    people (id) {
        id -> Uuid,
        first_name -> Nullable<Text>,
        last_name -> Nullable<Text>,
        email -> Nullable<Text>,
        phone -> Nullable<Text>,
        notes -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    automation_settings (id) {
        id -> Uuid,
        setting_key -> Text,
        enabled -> Bool,
        target_url -> Nullable<Text>,
        updated_by -> Nullable<Uuid>,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(pipeline_stages -> pipelines (pipeline_id));
diesel::joinable!(lead_stage_changes -> leads (lead_id));
diesel::joinable!(lead_notes -> leads (lead_id));
diesel::joinable!(campaign_tasks -> properties (property_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    pipelines,
    pipeline_stages,
    leads,
    lead_stage_changes,
    lead_notes,
    portal_webhook_events,
    properties,
    feature_aliases,
    campaign_tasks,
    documents,
    people,
    automation_settings,
);
