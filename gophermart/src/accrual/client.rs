use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;

use super::{AccrualClient, AccrualError, AccrualLookup, AccrualReport};

/// HTTP client for `GET {base}/api/orders/{number}`
#[derive(Clone)]
pub struct HttpAccrualClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAccrualClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, AccrualError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("gophermart/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

fn classify(e: reqwest::Error) -> AccrualError {
    if e.is_timeout() {
        AccrualError::Timeout
    } else {
        AccrualError::Transport(e)
    }
}

#[async_trait]
impl AccrualClient for HttpAccrualClient {
    async fn fetch_accrual_status(
        &self,
        order_number: &str,
    ) -> Result<AccrualLookup, AccrualError> {
        let url = format!("{}/api/orders/{}", self.base_url, order_number);
        let response = self.http.get(&url).send().await.map_err(classify)?;

        match response.status() {
            StatusCode::OK => {
                let body = response.bytes().await.map_err(classify)?;
                let report: AccrualReport = serde_json::from_slice(&body)
                    .map_err(|e| AccrualError::Decode(e.to_string()))?;
                if report.accrual.is_some_and(|a| a.is_sign_negative()) {
                    return Err(AccrualError::Decode(format!(
                        "negative accrual for order {}",
                        report.order
                    )));
                }
                Ok(AccrualLookup::Registered(AccrualReport {
                    accrual: report.accrual.map(|a| a.round_dp(2)),
                    ..report
                }))
            }
            StatusCode::NO_CONTENT => Ok(AccrualLookup::NotRegistered),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map(Duration::from_secs);
                Err(AccrualError::RateLimited { retry_after })
            }
            other => Err(AccrualError::UnexpectedStatus(other.as_u16())),
        }
    }
}
