use secrecy::SecretString;

/// Runtime configuration shared with every handler via an axum Extension.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub token_secret: SecretString,
    pub token_ttl_seconds: i64,
    pub movement_api_url: String,
    pub frontend_base_url: String,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(token_secret: SecretString) -> Self {
        Self {
            token_secret,
            token_ttl_seconds: 86_400,
            movement_api_url: String::new(),
            frontend_base_url: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_global_args() {
        let args = GlobalArgs::new(SecretString::from("hush"));
        assert_eq!(args.token_secret.expose_secret(), "hush");
        assert_eq!(args.token_ttl_seconds, 86_400);
        assert!(args.movement_api_url.is_empty());
    }
}
