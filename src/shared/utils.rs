use diesel::r2d2::{ConnectionManager, Pool};
use diesel::PgConnection;
use once_cell::sync::Lazy;
use regex::Regex;

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

/// `DATABASE_URL` wins over the assembled config URL so local overrides work.
pub fn create_conn(config_url: &str) -> Result<DbPool, diesel::r2d2::PoolError> {
    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| config_url.to_string());
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder().build(manager)
}

static NON_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9]").expect("valid regex"));

/// Normalize a phone number to E.164-ish form: digits only, with a leading `+`.
/// Numbers without a country prefix get the configured default (BR mobile
/// portals frequently omit it). Returns `None` when too few digits remain.
pub fn normalize_phone(raw: &str, default_country_code: &str) -> Option<String> {
    let had_plus = raw.trim_start().starts_with('+');
    let digits = NON_DIGITS.replace_all(raw, "").to_string();
    if digits.len() < 8 {
        return None;
    }
    if had_plus {
        return Some(format!("+{digits}"));
    }
    // Leading 00 is the international dial prefix
    if let Some(rest) = digits.strip_prefix("00") {
        if rest.len() >= 8 {
            return Some(format!("+{rest}"));
        }
        return None;
    }
    if digits.starts_with(default_country_code) && digits.len() > 11 {
        return Some(format!("+{digits}"));
    }
    Some(format!("+{default_country_code}{digits}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_formatted_numbers() {
        assert_eq!(
            normalize_phone("(11) 98765-4321", "55").as_deref(),
            Some("+5511987654321")
        );
        assert_eq!(
            normalize_phone("+1 (415) 555-0100", "55").as_deref(),
            Some("+14155550100")
        );
    }

    #[test]
    fn keeps_existing_country_code() {
        assert_eq!(
            normalize_phone("5511987654321", "55").as_deref(),
            Some("+5511987654321")
        );
    }

    #[test]
    fn international_dial_prefix_becomes_plus() {
        assert_eq!(
            normalize_phone("0034911222333", "55").as_deref(),
            Some("+34911222333")
        );
    }

    #[test]
    fn rejects_too_short_numbers() {
        assert_eq!(normalize_phone("1234", "55"), None);
        assert_eq!(normalize_phone("n/a", "55"), None);
    }
}
