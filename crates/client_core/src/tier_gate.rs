//! Account tier, the one-time paywall policy and the hand-off to billing.

use std::{fmt, str::FromStr, sync::Arc};

use shared::{
    domain::{Tier, UserProfile},
    protocol::CheckoutSessionRequest,
};
use tracing::{debug, info};

use crate::{
    error::{ClientError, LoginGate, Surface},
    ClientEvent, PromptClient,
};

const PAYWALL: &str = "paywall";

/// What the paywall policy says right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaywallDecision {
    /// Authentication or the profile is still loading.
    NotReady,
    NotNeeded,
    Show,
}

pub fn paywall_decision(
    auth_loading: bool,
    profile_loading: bool,
    profile: Option<&UserProfile>,
) -> PaywallDecision {
    if auth_loading || profile_loading {
        return PaywallDecision::NotReady;
    }
    match profile {
        Some(profile) if profile.tier == Tier::Free && !profile.has_seen_paywall_modal => {
            PaywallDecision::Show
        }
        _ => PaywallDecision::NotNeeded,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    Free,
    ProMonthly,
    ProYearly,
}

impl Plan {
    pub fn as_str(self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::ProMonthly => "pro_monthly",
            Plan::ProYearly => "pro_yearly",
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Plan::Free),
            "pro" | "monthly" | "pro_monthly" => Ok(Plan::ProMonthly),
            "yearly" | "pro_yearly" => Ok(Plan::ProYearly),
            other => Err(format!("unknown plan '{other}' (expected free, pro_monthly or pro_yearly)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanOutcome {
    /// Free plan kept; the paywall is marked seen.
    StayedFree,
    CheckoutStarted { checkout_url: String },
}

/// External billing collaborator that takes the user to a checkout page.
pub trait CheckoutRedirect: Send + Sync {
    fn open_checkout(&self, checkout_url: &str);
}

/// Logs the checkout url; for shells that cannot open a browser.
pub struct LoggingCheckoutRedirect;

impl CheckoutRedirect for LoggingCheckoutRedirect {
    fn open_checkout(&self, checkout_url: &str) {
        info!(checkout_url, "billing: continue checkout in a browser");
    }
}

impl PromptClient {
    pub async fn profile(&self) -> Option<UserProfile> {
        self.inner.lock().await.profile.clone()
    }

    pub async fn paywall_decision(&self) -> PaywallDecision {
        let guard = self.inner.lock().await;
        paywall_decision(
            self.auth.is_loading(),
            guard.profile_loading,
            guard.profile.as_ref(),
        )
    }

    pub async fn load_profile(&self) -> Result<UserProfile, ClientError> {
        let outcome = self.load_profile_impl().await;
        self.report(PAYWALL, outcome)
    }

    async fn load_profile_impl(&self) -> Result<UserProfile, ClientError> {
        self.inner.lock().await.profile_loading = true;
        let fetched = match self.bearer_token().await {
            Ok(token) => self.api.user_profile(&token).await,
            Err(err) => Err(err),
        };
        let profile = {
            let mut guard = self.inner.lock().await;
            guard.profile_loading = false;
            if let Ok(profile) = &fetched {
                guard.profile = Some(profile.clone());
            }
            guard.profile.clone()
        };
        if fetched.is_ok() {
            self.emit(ClientEvent::ProfileUpdated(profile));
        }
        fetched
    }

    /// Applies the paywall policy: a free account that has not seen the
    /// paywall gets a [`ClientEvent::ShowPaywall`] after the configured delay.
    pub async fn evaluate_paywall(self: &Arc<Self>) -> PaywallDecision {
        let decision = self.paywall_decision().await;
        if decision != PaywallDecision::Show {
            return decision;
        }
        let mut guard = self.inner.lock().await;
        if guard
            .paywall_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
        {
            return decision;
        }
        let client = Arc::downgrade(self);
        let delay = self.config.paywall_delay;
        guard.paywall_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(client) = client.upgrade() else {
                return;
            };
            if client.paywall_decision().await == PaywallDecision::Show {
                info!("paywall: showing tier selection");
                client.emit(ClientEvent::ShowPaywall);
            } else {
                debug!("paywall: condition cleared before the delay elapsed");
            }
        }));
        decision
    }

    /// Closes the paywall: marks it seen, then reloads the profile.
    pub async fn dismiss_paywall(&self) -> Result<(), ClientError> {
        let outcome = self.dismiss_paywall_impl().await;
        self.report(PAYWALL, outcome)
    }

    async fn dismiss_paywall_impl(&self) -> Result<(), ClientError> {
        self.require_login(LoginGate::Save)?;
        let _busy = self.begin(Surface::Paywall)?;
        let token = self.bearer_token().await?;
        self.mark_paywall_seen(&token).await
    }

    async fn mark_paywall_seen(&self, token: &str) -> Result<(), ClientError> {
        if let Some(task) = self.inner.lock().await.paywall_task.take() {
            task.abort();
        }
        self.api.mark_paywall_seen(token).await?;
        info!("paywall: marked as seen");
        self.load_profile_impl().await.map(|_| ())
    }

    /// Handles a tier choice from the paywall.
    ///
    /// Paid plans start a checkout session and hand its url to the
    /// [`CheckoutRedirect`]; the tier itself only changes once a later profile
    /// reload observes it.
    pub async fn choose_plan(&self, plan: Plan) -> Result<PlanOutcome, ClientError> {
        let outcome = self.choose_plan_impl(plan).await;
        self.report(PAYWALL, outcome)
    }

    async fn choose_plan_impl(&self, plan: Plan) -> Result<PlanOutcome, ClientError> {
        let price_id = match plan {
            Plan::Free => {
                self.dismiss_paywall_impl().await?;
                return Ok(PlanOutcome::StayedFree);
            }
            Plan::ProMonthly => self.config.billing.pro_monthly_price_id.clone(),
            Plan::ProYearly => self.config.billing.pro_yearly_price_id.clone(),
        };
        if !self.auth.is_authenticated() {
            self.auth.login().await;
            return Err(ClientError::LoginRequired(LoginGate::Checkout));
        }
        let price_id = price_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| ClientError::Billing(format!("Price ID not found for {plan} tier")))?;

        let _busy = self.begin(Surface::Paywall)?;
        let token = self.bearer_token().await?;
        self.mark_paywall_seen(&token).await?;
        let request = CheckoutSessionRequest {
            price_id,
            success_url: self.config.billing.success_url.clone(),
            cancel_url: self.config.billing.cancel_url.clone(),
        };
        let checkout_url = self
            .api
            .create_checkout_session(&token, &request)
            .await?
            .checkout_url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ClientError::Billing("Failed to create checkout session".to_string()))?;
        info!(%plan, "billing: checkout session created");
        self.checkout.open_checkout(&checkout_url);
        Ok(PlanOutcome::CheckoutStarted { checkout_url })
    }
}

#[cfg(test)]
#[path = "tests/tier_gate_tests.rs"]
mod tests;
