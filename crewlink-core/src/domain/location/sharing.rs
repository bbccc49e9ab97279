use std::{any::type_name_of_val, fmt, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use crewlink_model::{Actor, JobId, LocationCapability};
use serde::Serialize;

use crate::crypto::ShareCrypto;
use crate::database::ports::{
    JobRepository, LocationGrantRecord, LocationGrantRepository, LocationTokenRecord,
    LocationTokenRepository, NewLocationGrant,
};
use crate::error::{DomainError, DomainResult};

const MIN_PHONE_DIGITS: usize = 7;
const MAX_PHONE_DIGITS: usize = 15;

/// Verification attempts a grant survives. The attempt that reaches the
/// limit without the right code burns the grant.
pub const MAX_CODE_ATTEMPTS: i32 = 5;

/// Lifetimes of security codes and the tokens minted from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShareLifetimes {
    pub code_ttl: Duration,
    pub token_ttl: Duration,
}

impl Default for ShareLifetimes {
    fn default() -> Self {
        Self {
            code_ttl: Duration::minutes(30),
            token_ttl: Duration::hours(8),
        }
    }
}

/// A freshly issued security code. The code itself is only ever returned
/// here; storage keeps a keyed hash.
#[derive(Clone, Serialize)]
pub struct IssuedCode {
    pub job_id: JobId,
    pub security_code: String,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for IssuedCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedCode")
            .field("job_id", &self.job_id)
            .field("security_code", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// A scoped bearer token handed to a worker after code verification.
#[derive(Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub job_id: JobId,
    pub capabilities: Vec<LocationCapability>,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedToken")
            .field("token", &"<redacted>")
            .field("job_id", &self.job_id)
            .field("capabilities", &self.capabilities)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// What a valid token is allowed to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenScope {
    pub job_id: JobId,
    pub worker_phone_hash: String,
    pub capabilities: Vec<LocationCapability>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub grants: u64,
    pub tokens: u64,
}

/// Security-code issuance and the code-for-token exchange.
#[derive(Clone)]
pub struct LocationSharingService {
    jobs: Arc<dyn JobRepository>,
    grants: Arc<dyn LocationGrantRepository>,
    tokens: Arc<dyn LocationTokenRepository>,
    crypto: Arc<ShareCrypto>,
    lifetimes: ShareLifetimes,
}

impl fmt::Debug for LocationSharingService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocationSharingService")
            .field("grants", &type_name_of_val(self.grants.as_ref()))
            .field("tokens", &type_name_of_val(self.tokens.as_ref()))
            .field("lifetimes", &self.lifetimes)
            .finish_non_exhaustive()
    }
}

impl LocationSharingService {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        grants: Arc<dyn LocationGrantRepository>,
        tokens: Arc<dyn LocationTokenRepository>,
        crypto: Arc<ShareCrypto>,
    ) -> Self {
        Self {
            jobs,
            grants,
            tokens,
            crypto,
            lifetimes: ShareLifetimes::default(),
        }
    }

    pub fn with_lifetimes(mut self, lifetimes: ShareLifetimes) -> Self {
        self.lifetimes = lifetimes;
        self
    }

    pub fn lifetimes(&self) -> ShareLifetimes {
        self.lifetimes
    }

    /// Issue a single-use code for `worker_phone`, replacing any earlier
    /// grant for the same job and phone.
    pub async fn generate_code(
        &self,
        job_id: JobId,
        worker_phone: &str,
        actor: &Actor,
    ) -> DomainResult<IssuedCode> {
        let job = self
            .jobs
            .get(job_id)
            .await?
            .ok_or(DomainError::NotFound("job"))?;
        if !(actor.is_contractor() && job.is_assigned_to(actor.id)) {
            return Err(DomainError::unauthorized(
                "only the assigned contractor can share location access",
            ));
        }
        if !job.status.is_engaged() {
            return Err(DomainError::InvalidTransition(format!(
                "location can only be shared while a job is ACCEPTED or IN_PROGRESS, not {}",
                job.status
            )));
        }

        let phone = normalize_phone(worker_phone)?;
        let code = self.crypto.generate_code()?;
        let now = Utc::now();
        let expires_at = now + self.lifetimes.code_ttl;

        self.grants
            .replace(NewLocationGrant {
                job_id,
                worker_phone_hash: self.crypto.hash_phone(&phone),
                code_hash: self.crypto.hash_code(&job_id.to_string(), &code),
                issued_at: now,
                expires_at,
            })
            .await?;

        tracing::info!(%job_id, contractor_id = %actor.id, %expires_at, "location code issued");
        Ok(IssuedCode {
            job_id,
            security_code: code,
            expires_at,
        })
    }

    /// Exchange a code for a scoped token. Checks run in a fixed order:
    /// format, existence, prior use, expiry, then the code itself.
    pub async fn verify_code(
        &self,
        job_id: JobId,
        code: &str,
        worker_phone: &str,
    ) -> DomainResult<IssuedToken> {
        let code = code.trim();
        if code.len() != ShareCrypto::CODE_LENGTH || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DomainError::validation(format!(
                "security code must be {} digits",
                ShareCrypto::CODE_LENGTH
            )));
        }
        let phone = normalize_phone(worker_phone)?;
        let phone_hash = self.crypto.hash_phone(&phone);

        let Some(grant) = self.grants.find(job_id, &phone_hash).await? else {
            tracing::warn!(%job_id, "code verification without a grant");
            return Err(DomainError::NotFound("location grant"));
        };

        let now = Utc::now();
        let attempts = self.grants.record_attempt(job_id, &phone_hash, now).await?;

        if grant.consumed_at.is_some() {
            tracing::warn!(%job_id, attempts, "security code reused");
            return Err(DomainError::AlreadyUsed);
        }
        if now >= grant.expires_at {
            tracing::warn!(%job_id, expired_at = %grant.expires_at, "security code expired");
            return Err(DomainError::Expired {
                expired_at: grant.expires_at,
            });
        }

        let code_hash = self.crypto.hash_code(&job_id.to_string(), code);
        if !ShareCrypto::digests_match(&code_hash, &grant.code_hash) {
            tracing::warn!(%job_id, attempts, "security code mismatch");
            if attempts >= MAX_CODE_ATTEMPTS {
                self.burn(&grant, now).await?;
            }
            return Err(DomainError::InvalidCode);
        }

        if !self
            .grants
            .mark_consumed(job_id, &phone_hash, &code_hash, now)
            .await?
        {
            tracing::warn!(%job_id, "security code consumed concurrently");
            return Err(DomainError::AlreadyUsed);
        }

        let token = self.crypto.generate_token()?;
        let record = LocationTokenRecord {
            token_hash: self.crypto.hash_token(&token),
            job_id,
            worker_phone_hash: phone_hash,
            capabilities: LocationCapability::WORKER_DEFAULT.to_vec(),
            issued_at: now,
            expires_at: now + self.lifetimes.token_ttl,
        };
        self.tokens.insert(record.clone()).await?;

        tracing::info!(%job_id, expires_at = %record.expires_at, "location token issued");
        Ok(IssuedToken {
            token,
            job_id,
            capabilities: record.capabilities,
            expires_at: record.expires_at,
        })
    }

    /// Resolve a bearer token and check it carries `capability`.
    pub async fn authorize(
        &self,
        token: &str,
        capability: LocationCapability,
    ) -> DomainResult<TokenScope> {
        let token = token.trim();
        if token.is_empty() {
            return Err(DomainError::unauthorized("missing location token"));
        }

        let Some(record) = self
            .tokens
            .find_by_hash(&self.crypto.hash_token(token))
            .await?
        else {
            tracing::warn!(%capability, "unknown location token presented");
            return Err(DomainError::unauthorized("unknown location token"));
        };

        if Utc::now() >= record.expires_at {
            return Err(DomainError::Expired {
                expired_at: record.expires_at,
            });
        }
        if !record.capabilities.contains(&capability) {
            tracing::warn!(job_id = %record.job_id, %capability, "location token scope mismatch");
            return Err(DomainError::unauthorized(format!(
                "token does not allow {capability}"
            )));
        }

        Ok(TokenScope {
            job_id: record.job_id,
            worker_phone_hash: record.worker_phone_hash,
            capabilities: record.capabilities,
            expires_at: record.expires_at,
        })
    }

    async fn burn(&self, grant: &LocationGrantRecord, now: DateTime<Utc>) -> DomainResult<()> {
        if self
            .grants
            .mark_consumed(grant.job_id, &grant.worker_phone_hash, &grant.code_hash, now)
            .await?
        {
            tracing::warn!(job_id = %grant.job_id, "security code locked after too many attempts");
        }
        Ok(())
    }

    pub async fn purge_expired(&self, before: DateTime<Utc>) -> DomainResult<PurgeReport> {
        let report = PurgeReport {
            grants: self.grants.purge_expired(before).await?,
            tokens: self.tokens.purge_expired(before).await?,
        };
        if report != PurgeReport::default() {
            tracing::debug!(grants = report.grants, tokens = report.tokens, "purged expired location credentials");
        }
        Ok(report)
    }
}

/// Reduce a phone number to its digits. Spaces, dashes, dots, brackets and
/// a leading `+` are formatting.
pub fn normalize_phone(raw: &str) -> DomainResult<String> {
    let raw = raw.trim();
    let mut digits = String::with_capacity(raw.len());
    for (idx, ch) in raw.chars().enumerate() {
        match ch {
            '0'..='9' => digits.push(ch),
            '+' if idx == 0 => {}
            ' ' | '-' | '.' | '(' | ')' => {}
            _ => return Err(DomainError::validation("phone number contains invalid characters")),
        }
    }

    if !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits.len()) {
        return Err(DomainError::validation(format!(
            "phone number must have between {MIN_PHONE_DIGITS} and {MAX_PHONE_DIGITS} digits"
        )));
    }
    Ok(digits)
}
