use qryptic_gateway_client::GatewayClient;
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub gateway_client: GatewayClient,
    /// Plain HTTP client for SSO provider calls (no gateway timeout).
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(pool: PgPool) -> Result<Self, reqwest::Error> {
        Ok(Self {
            pool,
            gateway_client: GatewayClient::new()?,
            http: reqwest::Client::builder().build()?,
        })
    }
}
