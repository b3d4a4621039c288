// config.rs
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    /// Access credential lifetime, in minutes.
    pub jwt_maxage: i64,
    /// Refresh credential lifetime, in days.
    pub jwt_refresh_maxage: i64,
    pub port: u16,
    pub redis_url: Option<String>,
    pub allowed_origins: Vec<String>,
    pub media_root: String,
    pub log_level: String,
    // Mail delivery
    pub resend_api_key: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_email: String,
    // Administrator bootstrap
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

fn optional_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

impl Config {
    pub fn init() -> Config {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let jwt_secret = std::env::var("JWT_SECRET_KEY").expect("JWT_SECRET_KEY must be set");
        let jwt_maxage = std::env::var("JWT_MAXAGE").expect("JWT_MAXAGE must be set");

        let jwt_refresh_maxage = optional_var("JWT_REFRESH_MAXAGE")
            .and_then(|value| value.parse::<i64>().ok())
            .unwrap_or(7);
        let port = optional_var("PORT")
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(8000);

        let allowed_origins = optional_var("ALLOWED_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173,http://localhost:3000".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Config {
            database_url,
            jwt_secret,
            jwt_maxage: jwt_maxage
                .parse::<i64>()
                .expect("JWT_MAXAGE must be a number of minutes"),
            jwt_refresh_maxage,
            port,
            redis_url: optional_var("REDIS_URL"),
            allowed_origins,
            media_root: optional_var("MEDIA_ROOT").unwrap_or_else(|| "./media".to_string()),
            log_level: optional_var("LOG_LEVEL").unwrap_or_else(|| "debug".to_string()),
            resend_api_key: optional_var("RESEND_API_KEY"),
            smtp_host: optional_var("SMTP_HOST"),
            smtp_port: optional_var("SMTP_PORT")
                .and_then(|value| value.parse().ok())
                .unwrap_or(587),
            smtp_username: std::env::var("SMTP_USERNAME").unwrap_or_default(),
            smtp_password: std::env::var("SMTP_PASSWORD").unwrap_or_default(),
            from_email: optional_var("FROM_EMAIL")
                .unwrap_or_else(|| "Redevabilité Verte <noreply@localhost>".to_string()),
            admin_email: optional_var("ADMIN_EMAIL"),
            admin_password: optional_var("ADMIN_PASSWORD"),
        }
    }

    #[cfg(test)]
    pub fn for_tests() -> Config {
        Config {
            database_url: "postgres://localhost/civic_test".to_string(),
            jwt_secret: "test-secret".to_string(),
            jwt_maxage: 60,
            jwt_refresh_maxage: 7,
            port: 8000,
            redis_url: None,
            allowed_origins: vec!["http://localhost:5173".to_string()],
            media_root: std::env::temp_dir()
                .join("civic-backend-tests")
                .to_string_lossy()
                .into_owned(),
            log_level: "debug".to_string(),
            resend_api_key: None,
            smtp_host: None,
            smtp_port: 587,
            smtp_username: String::new(),
            smtp_password: String::new(),
            from_email: "test <noreply@localhost>".to_string(),
            admin_email: None,
            admin_password: None,
        }
    }
}
