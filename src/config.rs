use once_cell::sync::Lazy;

/// Secret used for JWT verification. Must be set via the `JWT_SECRET` env variable.
pub static JWT_SECRET: Lazy<String> =
    Lazy::new(|| std::env::var("JWT_SECRET").expect("JWT_SECRET must be set"));

/// Address the HTTP server should bind to. Defaults to `0.0.0.0`.
pub static BIND_ADDRESS: Lazy<String> =
    Lazy::new(|| std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string()));

/// Port the HTTP server should listen on. Defaults to `3000`.
pub static BIND_PORT: Lazy<u16> = Lazy::new(|| {
    std::env::var("BIND_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(3000)
});

/// When set to a truthy value, allows the application to continue running even if database
/// migrations fail. Defaults to `false`.
pub static ALLOW_MIGRATION_FAILURE: Lazy<bool> = Lazy::new(|| {
    std::env::var("ALLOW_MIGRATION_FAILURE")
        .ok()
        .map(|value| {
            let normalized = value.trim().to_ascii_lowercase();
            matches!(normalized.as_str(), "1" | "true" | "yes")
        })
        .unwrap_or(false)
});

/// key: billing-config -> reconciliation scan cadence
pub static BILLING_RECONCILE_INTERVAL_SECS: Lazy<u64> = Lazy::new(|| {
    std::env::var("BILLING_RECONCILE_INTERVAL_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(3600)
});

/// key: billing-config -> max concurrent per-record updates within one run
pub static BILLING_RECONCILE_CONCURRENCY: Lazy<usize> = Lazy::new(|| {
    std::env::var("BILLING_RECONCILE_CONCURRENCY")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(8)
});

/// key: billing-config -> deadline for a single notification send
pub static BILLING_NOTIFY_TIMEOUT_SECS: Lazy<u64> = Lazy::new(|| {
    std::env::var("BILLING_NOTIFY_TIMEOUT_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(10)
});

/// SMTP relay host for outbound client notifications. When unset, notifications
/// are logged instead of sent.
pub static SMTP_HOST: Lazy<Option<String>> = Lazy::new(|| read_optional_env("SMTP_HOST"));

/// SMTP relay port. Defaults to `587` (STARTTLS).
pub static SMTP_PORT: Lazy<u16> = Lazy::new(|| {
    std::env::var("SMTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(587)
});

/// Optional SMTP credentials.
pub static SMTP_USERNAME: Lazy<Option<String>> = Lazy::new(|| read_optional_env("SMTP_USERNAME"));
pub static SMTP_PASSWORD: Lazy<Option<String>> = Lazy::new(|| read_optional_env("SMTP_PASSWORD"));

/// Sender address used for billing notifications. Defaults to `billing@localhost`.
pub static SMTP_FROM: Lazy<String> = Lazy::new(|| {
    std::env::var("SMTP_FROM").unwrap_or_else(|_| "billing@localhost".to_string())
});

fn read_optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
