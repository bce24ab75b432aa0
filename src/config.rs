use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "DATABASE_URL")]
    pub db_url: String,
    #[envconfig(from = "PORT", default = "8080")]
    pub port: u16,
    /// Hosted project URL, e.g. `https://xyz.supabase.co`.
    #[envconfig(from = "BACKEND_URL")]
    pub backend_url: String,
    /// Public (anon) API key sent with every hosted auth and storage call.
    #[envconfig(from = "BACKEND_ANON_KEY")]
    pub backend_anon_key: String,
    /// Secret the hosted auth service signs access tokens with.
    #[envconfig(from = "BACKEND_JWT_SECRET")]
    pub jwt_secret: String,
}
