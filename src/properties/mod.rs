pub mod features;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::shared::schema::{feature_aliases, properties};
use crate::shared::state::AppState;

pub use features::{canonical_feature, merge_features};

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = properties)]
pub struct Property {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub listing_type: String,
    pub status: String,
    pub features: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = feature_aliases)]
pub struct FeatureAlias {
    pub id: Uuid,
    pub alias: String,
    pub canonical: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePropertyRequest {
    pub title: String,
    pub description: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub listing_type: Option<String>,
    pub features: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePropertyRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub price: Option<f64>,
    pub status: Option<String>,
    /// Merged into the existing feature list after canonicalization.
    pub features: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub city: Option<String>,
    pub status: Option<String>,
    pub listing_type: Option<String>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAliasRequest {
    pub alias: String,
    pub canonical: String,
}

pub fn load_alias_map(conn: &mut PgConnection) -> HashMap<String, String> {
    feature_aliases::table
        .select((feature_aliases::alias, feature_aliases::canonical))
        .load::<(String, String)>(conn)
        .unwrap_or_default()
        .into_iter()
        .map(|(a, c)| (a.to_lowercase(), c.to_lowercase()))
        .collect()
}

pub async fn create_property(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePropertyRequest>,
) -> Result<Json<Property>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let aliases = load_alias_map(&mut conn);
    let now = Utc::now();

    let property = Property {
        id: Uuid::new_v4(),
        title: req.title,
        description: req.description,
        address: req.address,
        city: req.city,
        price: req.price,
        currency: req.currency.or(Some("BRL".to_string())),
        listing_type: req.listing_type.unwrap_or_else(|| "sale".to_string()),
        status: "active".to_string(),
        features: merge_features(&[], &req.features.unwrap_or_default(), &aliases),
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(properties::table)
        .values(&property)
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert error: {e}")))?;

    Ok(Json(property))
}

pub async fn list_properties(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Property>>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let limit = query.limit.unwrap_or(50);
    let offset = query.offset.unwrap_or(0);

    let mut q = properties::table.into_boxed();
    if let Some(city) = query.city {
        q = q.filter(properties::city.eq(city));
    }
    if let Some(status) = query.status {
        q = q.filter(properties::status.eq(status));
    }
    if let Some(listing_type) = query.listing_type {
        q = q.filter(properties::listing_type.eq(listing_type));
    }
    if let Some(search) = query.search {
        let pattern = format!("%{search}%");
        q = q.filter(
            properties::title
                .ilike(pattern.clone())
                .or(properties::address.ilike(pattern)),
        );
    }

    let rows: Vec<Property> = q
        .order(properties::created_at.desc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    Ok(Json(rows))
}

pub async fn get_property(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Property>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let property: Property = properties::table
        .filter(properties::id.eq(id))
        .first(&mut conn)
        .map_err(|_| (StatusCode::NOT_FOUND, "Property not found".to_string()))?;

    Ok(Json(property))
}

pub async fn update_property(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdatePropertyRequest>,
) -> Result<Json<Property>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let current: Property = properties::table
        .filter(properties::id.eq(id))
        .first(&mut conn)
        .map_err(|_| (StatusCode::NOT_FOUND, "Property not found".to_string()))?;

    let now = Utc::now();
    diesel::update(properties::table.filter(properties::id.eq(id)))
        .set(properties::updated_at.eq(now))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;

    if let Some(title) = req.title {
        diesel::update(properties::table.filter(properties::id.eq(id)))
            .set(properties::title.eq(title))
            .execute(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    }
    if let Some(description) = req.description {
        diesel::update(properties::table.filter(properties::id.eq(id)))
            .set(properties::description.eq(description))
            .execute(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    }
    if let Some(address) = req.address {
        diesel::update(properties::table.filter(properties::id.eq(id)))
            .set(properties::address.eq(address))
            .execute(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    }
    if let Some(city) = req.city {
        diesel::update(properties::table.filter(properties::id.eq(id)))
            .set(properties::city.eq(city))
            .execute(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    }
    if let Some(price) = req.price {
        diesel::update(properties::table.filter(properties::id.eq(id)))
            .set(properties::price.eq(price))
            .execute(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    }
    if let Some(status) = req.status {
        diesel::update(properties::table.filter(properties::id.eq(id)))
            .set(properties::status.eq(status))
            .execute(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    }
    if let Some(incoming) = req.features {
        let aliases = load_alias_map(&mut conn);
        let merged = merge_features(&current.features, &incoming, &aliases);
        diesel::update(properties::table.filter(properties::id.eq(id)))
            .set(properties::features.eq(merged))
            .execute(&mut conn)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;
    }

    get_property(State(state), Path(id)).await
}

pub async fn delete_property(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    diesel::delete(properties::table.filter(properties::id.eq(id)))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Delete error: {e}")))?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_aliases(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<FeatureAlias>>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let rows: Vec<FeatureAlias> = feature_aliases::table
        .order(feature_aliases::alias.asc())
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    Ok(Json(rows))
}

pub async fn create_alias(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<CreateAliasRequest>,
) -> Result<Json<FeatureAlias>, (StatusCode, String)> {
    if !user.is_admin {
        return Err((
            StatusCode::FORBIDDEN,
            "Admin access required".to_string(),
        ));
    }
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let alias = FeatureAlias {
        id: Uuid::new_v4(),
        alias: req.alias.trim().to_lowercase(),
        canonical: req.canonical.trim().to_lowercase(),
        created_at: Utc::now(),
    };

    if alias.alias.is_empty() || alias.canonical.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Alias and canonical must be non-empty".to_string(),
        ));
    }

    diesel::insert_into(feature_aliases::table)
        .values(&alias)
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert error: {e}")))?;

    Ok(Json(alias))
}

pub async fn delete_alias(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    if !user.is_admin {
        return Err((
            StatusCode::FORBIDDEN,
            "Admin access required".to_string(),
        ));
    }
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    diesel::delete(feature_aliases::table.filter(feature_aliases::id.eq(id)))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Delete error: {e}")))?;

    Ok(StatusCode::NO_CONTENT)
}

pub fn configure() -> Router<Arc<AppState>> {
    // Alias catalog mutations check for the admin role in-handler.
    Router::new()
        .route("/api/properties", get(list_properties).post(create_property))
        .route(
            "/api/properties/:id",
            get(get_property).put(update_property).delete(delete_property),
        )
        .route(
            "/api/catalog/feature-aliases",
            get(list_aliases).post(create_alias),
        )
        .route(
            "/api/catalog/feature-aliases/:id",
            axum::routing::delete(delete_alias),
        )
}
