//! Stripe webhook signature verification.
//!
//! The `Stripe-Signature` header has the form
//! `t=<unix seconds>,v1=<hex hmac>[,v1=<hex hmac>...]`. Each `v1` is
//! HMAC-SHA256 under the endpoint secret of `"{t}." || raw body`. Any
//! matching `v1` authenticates the payload; other schemes (`v0`) are ignored.

use chrono::Utc;

use crate::crypto::{constant_time_eq, hmac_sha256_hex};

/// Header carrying the webhook signature.
pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

/// Default timestamp tolerance, matching Stripe's own libraries.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Why a webhook signature was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// No signature header on the request.
    #[error("No stripe-signature header value was provided")]
    MissingHeader,

    /// Header present but without a usable timestamp.
    #[error("Unable to extract timestamp and signatures from header")]
    MalformedHeader,

    /// Header has no `v1` entries.
    #[error("No signatures found with expected scheme")]
    NoSignatures,

    /// None of the `v1` entries match the payload.
    #[error("No signatures found matching the expected signature for payload")]
    Mismatch,

    /// Timestamp is further from now than the tolerance allows.
    #[error("Timestamp outside the tolerance zone")]
    OutsideTolerance {
        /// Seconds between now and the signed timestamp; negative when in the future.
        age_secs: i64,
    },
}

/// Parsed `Stripe-Signature` header.
#[derive(Debug, PartialEq, Eq)]
struct SignatureHeader<'a> {
    timestamp: i64,
    signatures: Vec<&'a str>,
}

impl<'a> SignatureHeader<'a> {
    fn parse(header: &'a str) -> Result<Self, SignatureError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", ts)) => timestamp = ts.parse::<i64>().ok(),
                Some(("v1", sig)) if !sig.is_empty() => signatures.push(sig),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
        if signatures.is_empty() {
            return Err(SignatureError::NoSignatures);
        }

        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

/// Verifies webhook deliveries against the endpoint secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    /// Create a verifier for the given signing secret.
    pub fn new(secret: impl Into<String>, tolerance_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
        }
    }

    /// Verify `payload` against the signature header using the current clock.
    pub fn verify(&self, payload: &[u8], header: Option<&str>) -> Result<(), SignatureError> {
        self.verify_at(payload, header, Utc::now().timestamp())
    }

    /// Verify `payload` as of the unix time `now`.
    ///
    /// The signature is checked before the timestamp, so a stale but genuine
    /// delivery is distinguishable from a forged one in the logs.
    pub fn verify_at(
        &self,
        payload: &[u8],
        header: Option<&str>,
        now: i64,
    ) -> Result<(), SignatureError> {
        let header = SignatureHeader::parse(header.ok_or(SignatureError::MissingHeader)?)?;

        let timestamp = header.timestamp.to_string();
        let expected = hmac_sha256_hex(&self.secret, &[timestamp.as_bytes(), b".", payload]);

        if !header
            .signatures
            .iter()
            .any(|sig| constant_time_eq(&expected, &sig.to_ascii_lowercase()))
        {
            return Err(SignatureError::Mismatch);
        }

        let age_secs = now.saturating_sub(header.timestamp);
        if age_secs.abs() > self.tolerance_secs {
            return Err(SignatureError::OutsideTolerance { age_secs });
        }

        Ok(())
    }

    /// Build a header value signing `payload` at `timestamp`.
    ///
    /// Used by tests and local tooling that replays deliveries.
    #[must_use]
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> String {
        let ts = timestamp.to_string();
        let signature = hmac_sha256_hex(&self.secret, &[ts.as_bytes(), b".", payload]);
        format!("t={ts},v1={signature}")
    }
}
