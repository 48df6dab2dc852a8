//! Least-privilege credential scope for the release principal
//!
//! The pipeline principal may only list the origin bucket, put and delete its
//! objects, and create invalidations on its distribution. Every store and
//! edge call made by a release goes through [`ScopedStore`] or
//! [`ScopedInvalidator`], so an action outside the grant fails with a
//! permission error before it reaches the provider.

use crate::services::invalidator::{
    EdgeInvalidator, InvalidationError, InvalidationRequest, InvalidationStatus,
};
use async_trait::async_trait;
use s3_utils::{ObjectStore, ObjectVersion, PutOutcome, PutRequest, RemoteObject, StorageError};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Action {
    PutObject,
    DeleteObject,
    ListBucket,
    CreateInvalidation,
    ListBucketVersions,
    GetObjectVersion,
    GetInvalidation,
    /// Any other IAM action string
    Other(String),
}

impl Action {
    pub fn parse(name: &str) -> Self {
        match name {
            "s3:PutObject" => Action::PutObject,
            "s3:DeleteObject" => Action::DeleteObject,
            "s3:ListBucket" => Action::ListBucket,
            "cloudfront:CreateInvalidation" => Action::CreateInvalidation,
            "s3:ListBucketVersions" => Action::ListBucketVersions,
            "s3:GetObjectVersion" => Action::GetObjectVersion,
            "cloudfront:GetInvalidation" => Action::GetInvalidation,
            other => Action::Other(other.to_string()),
        }
    }

    pub fn iam_name(&self) -> &str {
        match self {
            Action::PutObject => "s3:PutObject",
            Action::DeleteObject => "s3:DeleteObject",
            Action::ListBucket => "s3:ListBucket",
            Action::CreateInvalidation => "cloudfront:CreateInvalidation",
            Action::ListBucketVersions => "s3:ListBucketVersions",
            Action::GetObjectVersion => "s3:GetObjectVersion",
            Action::GetInvalidation => "cloudfront:GetInvalidation",
            Action::Other(name) => name,
        }
    }

    fn is_wildcard(&self) -> bool {
        self.iam_name().contains('*')
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.iam_name())
    }
}

/// Which principal a grant describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantKind {
    /// Push-triggered releases
    Pipeline,
    /// Operator-run rollback and freshness checks
    Operator,
}

impl GrantKind {
    pub fn required_actions(&self) -> BTreeSet<Action> {
        let mut actions = BTreeSet::from([
            Action::PutObject,
            Action::DeleteObject,
            Action::ListBucket,
            Action::CreateInvalidation,
        ]);
        if *self == GrantKind::Operator {
            actions.extend([
                Action::ListBucketVersions,
                Action::GetObjectVersion,
                Action::GetInvalidation,
            ]);
        }
        actions
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantViolation {
    ExcessiveAction(String),
    MissingAction(String),
    WildcardAction(String),
    WildcardResource(String),
    InvalidAccountId(String),
    MissingAccountId,
}

impl fmt::Display for GrantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrantViolation::ExcessiveAction(a) => write!(f, "action {} is broader than needed", a),
            GrantViolation::MissingAction(a) => write!(f, "required action {} is missing", a),
            GrantViolation::WildcardAction(a) => write!(f, "wildcard action {} is not allowed", a),
            GrantViolation::WildcardResource(r) => {
                write!(f, "resource {} is not scoped to a single target", r)
            }
            GrantViolation::InvalidAccountId(id) => {
                write!(f, "account id {} is not a 12-digit AWS account", id)
            }
            GrantViolation::MissingAccountId => {
                write!(f, "account id is required to scope the distribution ARN")
            }
        }
    }
}

/// Enumerated actions over exactly one bucket and one distribution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialGrant {
    pub principal: String,
    pub kind: GrantKind,
    pub bucket: String,
    pub distribution_id: String,
    pub account_id: Option<String>,
    actions: BTreeSet<Action>,
}

impl CredentialGrant {
    /// Minimal grant used by push-triggered releases
    pub fn pipeline(
        bucket: impl Into<String>,
        distribution_id: impl Into<String>,
        account_id: Option<String>,
    ) -> Self {
        Self::for_kind(GrantKind::Pipeline, "release-pipeline", bucket, distribution_id, account_id)
    }

    /// Pipeline grant plus version reads and invalidation status
    pub fn operator(
        bucket: impl Into<String>,
        distribution_id: impl Into<String>,
        account_id: Option<String>,
    ) -> Self {
        Self::for_kind(GrantKind::Operator, "release-operator", bucket, distribution_id, account_id)
    }

    fn for_kind(
        kind: GrantKind,
        principal: &str,
        bucket: impl Into<String>,
        distribution_id: impl Into<String>,
        account_id: Option<String>,
    ) -> Self {
        Self {
            principal: principal.to_string(),
            kind,
            bucket: bucket.into(),
            distribution_id: distribution_id.into(),
            account_id,
            actions: kind.required_actions(),
        }
    }

    /// Add an action beyond the defaults; [`CredentialGrant::validate`] will flag it
    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.insert(action);
        self
    }

    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter()
    }

    pub fn allows(&self, action: &Action) -> bool {
        self.actions.contains(action)
    }

    /// ARN an action applies to under this grant
    pub fn resource_arn(&self, action: &Action) -> String {
        match action {
            Action::ListBucket | Action::ListBucketVersions => {
                format!("arn:aws:s3:::{}", self.bucket)
            }
            Action::CreateInvalidation | Action::GetInvalidation => format!(
                "arn:aws:cloudfront::{}:distribution/{}",
                self.account_id.as_deref().unwrap_or("*"),
                self.distribution_id
            ),
            _ => format!("arn:aws:s3:::{}/*", self.bucket),
        }
    }

    /// Check the grant is exactly the minimal set for its kind
    pub fn validate(&self) -> Vec<GrantViolation> {
        let mut violations = Vec::new();
        let required = self.kind.required_actions();

        for action in &self.actions {
            if action.is_wildcard() {
                violations.push(GrantViolation::WildcardAction(action.to_string()));
            } else if !required.contains(action) {
                violations.push(GrantViolation::ExcessiveAction(action.to_string()));
            }
        }
        for action in required.difference(&self.actions) {
            violations.push(GrantViolation::MissingAction(action.to_string()));
        }

        for target in [&self.bucket, &self.distribution_id] {
            if target.is_empty() || target.contains('*') || target.contains('?') {
                violations.push(GrantViolation::WildcardResource(target.clone()));
            }
        }

        match &self.account_id {
            None => violations.push(GrantViolation::MissingAccountId),
            Some(id) if id.len() != 12 || !id.chars().all(|c| c.is_ascii_digit()) => {
                violations.push(GrantViolation::InvalidAccountId(id.clone()))
            }
            Some(_) => {}
        }

        violations
    }

    /// IAM policy document, one statement per resource
    pub fn policy_document(&self) -> Value {
        let mut by_resource: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for action in &self.actions {
            by_resource
                .entry(self.resource_arn(action))
                .or_default()
                .push(action.to_string());
        }

        let statements: Vec<Value> = by_resource
            .into_iter()
            .enumerate()
            .map(|(idx, (resource, actions))| {
                json!({
                    "Sid": format!("ReleaseScope{}", idx + 1),
                    "Effect": "Allow",
                    "Action": actions,
                    "Resource": resource,
                })
            })
            .collect();

        json!({
            "Version": "2012-10-17",
            "Statement": statements,
        })
    }

    fn authorize_bucket(&self, action: Action, bucket: &str, key: Option<&str>) -> Result<(), StorageError> {
        if self.allows(&action) && bucket == self.bucket {
            return Ok(());
        }

        let resource = match key {
            Some(key) => format!("arn:aws:s3:::{}/{}", bucket, key),
            None => format!("arn:aws:s3:::{}", bucket),
        };
        warn!(principal = %self.principal, action = %action, %resource, "Denied by credential scope");
        Err(StorageError::AccessDenied {
            action: action.to_string(),
            resource,
        })
    }

    fn authorize_distribution(&self, action: Action, distribution_id: &str) -> Result<(), InvalidationError> {
        if self.allows(&action) && distribution_id == self.distribution_id {
            return Ok(());
        }

        let resource = format!("distribution/{}", distribution_id);
        warn!(principal = %self.principal, action = %action, %resource, "Denied by credential scope");
        Err(InvalidationError::AccessDenied {
            action: action.to_string(),
            resource,
        })
    }
}

/// Object store that only forwards calls the grant allows
pub struct ScopedStore {
    inner: Arc<dyn ObjectStore>,
    grant: Arc<CredentialGrant>,
}

impl ScopedStore {
    pub fn new(inner: Arc<dyn ObjectStore>, grant: Arc<CredentialGrant>) -> Self {
        Self { inner, grant }
    }
}

#[async_trait]
impl ObjectStore for ScopedStore {
    fn bucket(&self) -> &str {
        self.inner.bucket()
    }

    async fn head_bucket(&self) -> Result<(), StorageError> {
        self.grant
            .authorize_bucket(Action::ListBucket, self.inner.bucket(), None)?;
        self.inner.head_bucket().await
    }

    async fn list_objects(&self) -> Result<Vec<RemoteObject>, StorageError> {
        self.grant
            .authorize_bucket(Action::ListBucket, self.inner.bucket(), None)?;
        self.inner.list_objects().await
    }

    async fn put_object(&self, request: PutRequest) -> Result<PutOutcome, StorageError> {
        self.grant
            .authorize_bucket(Action::PutObject, self.inner.bucket(), Some(&request.key))?;
        self.inner.put_object(request).await
    }

    async fn delete_object(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.grant
            .authorize_bucket(Action::DeleteObject, self.inner.bucket(), Some(key))?;
        self.inner.delete_object(key).await
    }

    async fn list_object_versions(&self, key: &str) -> Result<Vec<ObjectVersion>, StorageError> {
        self.grant
            .authorize_bucket(Action::ListBucketVersions, self.inner.bucket(), None)?;
        self.inner.list_object_versions(key).await
    }

    async fn restore_version(
        &self,
        key: &str,
        version_id: &str,
    ) -> Result<PutOutcome, StorageError> {
        // Copy-from-version reads the old version and writes a new one
        self.grant
            .authorize_bucket(Action::GetObjectVersion, self.inner.bucket(), Some(key))?;
        self.grant
            .authorize_bucket(Action::PutObject, self.inner.bucket(), Some(key))?;
        self.inner.restore_version(key, version_id).await
    }
}

/// Edge control plane that only forwards calls the grant allows
pub struct ScopedInvalidator {
    inner: Arc<dyn EdgeInvalidator>,
    grant: Arc<CredentialGrant>,
}

impl ScopedInvalidator {
    pub fn new(inner: Arc<dyn EdgeInvalidator>, grant: Arc<CredentialGrant>) -> Self {
        Self { inner, grant }
    }
}

#[async_trait]
impl EdgeInvalidator for ScopedInvalidator {
    async fn create_invalidation(
        &self,
        request: &InvalidationRequest,
    ) -> Result<String, InvalidationError> {
        self.grant
            .authorize_distribution(Action::CreateInvalidation, &request.distribution_id)?;
        self.inner.create_invalidation(request).await
    }

    async fn invalidation_status(
        &self,
        distribution_id: &str,
        invalidation_id: &str,
    ) -> Result<InvalidationStatus, InvalidationError> {
        self.grant
            .authorize_distribution(Action::GetInvalidation, distribution_id)?;
        self.inner
            .invalidation_status(distribution_id, invalidation_id)
            .await
    }
}
