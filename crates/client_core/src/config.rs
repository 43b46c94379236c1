use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_PAYWALL_DELAY: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BillingConfig {
    pub pro_monthly_price_id: Option<String>,
    pub pro_yearly_price_id: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_base_url: String,
    /// Settle time before the paywall surface is shown.
    pub paywall_delay: Duration,
    pub billing: BillingConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            paywall_delay: DEFAULT_PAYWALL_DELAY,
            billing: BillingConfig {
                pro_monthly_price_id: None,
                pro_yearly_price_id: None,
                success_url: format!("{DEFAULT_API_BASE_URL}/billing/success"),
                cancel_url: format!("{DEFAULT_API_BASE_URL}/billing/cancel"),
            },
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: base_url.into(),
            ..Self::default()
        }
    }
}
