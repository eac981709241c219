//! Cache key generation with tenant scoping
//!
//! Keys look like `prefix:user:org:collection:operation[:id][:params]`.
//! Params are canonicalised with object keys sorted so that two permutations
//! of the same query always land on the same entry.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

/// Default namespace prefix for every cache key
pub const DEFAULT_PREFIX: &str = "pbcache";

/// Scope used when no user is signed in
pub const ANONYMOUS_USER: &str = "anonymous";

/// Scope used when no organization is selected
pub const DEFAULT_ORG: &str = "default";

/// The (user, organization) pair partitioning cached data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantScope {
    pub user_id: String,
    pub organization_id: String,
}

impl TenantScope {
    pub fn new(user_id: impl Into<String>, organization_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            organization_id: organization_id.into(),
        }
    }

    /// Build a scope from optional session values, falling back to
    /// `anonymous` / `default` for whatever is missing.
    pub fn from_parts(user_id: Option<&str>, organization_id: Option<&str>) -> Self {
        Self::new(
            user_id.filter(|u| !u.is_empty()).unwrap_or(ANONYMOUS_USER),
            organization_id
                .filter(|o| !o.is_empty())
                .unwrap_or(DEFAULT_ORG),
        )
    }

    pub fn anonymous() -> Self {
        Self::new(ANONYMOUS_USER, DEFAULT_ORG)
    }
}

impl Default for TenantScope {
    fn default() -> Self {
        Self::anonymous()
    }
}

/// Resolves the ambient tenant scope.
///
/// Called on every key derivation; implementations must never cache the
/// result on behalf of a caller.
pub trait ScopeProvider: Send + Sync {
    /// Current scope, or `None` when there is no session.
    fn current_scope(&self) -> Option<TenantScope>;
}

/// Shared, switchable scope handle owned by the session layer.
#[derive(Debug, Clone, Default)]
pub struct SessionScope {
    inner: Arc<RwLock<Option<TenantScope>>>,
}

impl SessionScope {
    pub fn new(scope: Option<TenantScope>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(scope)),
        }
    }

    pub fn set(&self, scope: Option<TenantScope>) {
        match self.inner.write() {
            Ok(mut guard) => *guard = scope,
            Err(poisoned) => *poisoned.into_inner() = scope,
        }
    }
}

impl ScopeProvider for SessionScope {
    fn current_scope(&self) -> Option<TenantScope> {
        self.inner.read().ok().and_then(|guard| guard.clone())
    }
}

/// Resolve a scope, degrading to `anonymous` / `default` when resolution fails.
pub fn resolve_scope(provider: Option<&dyn ScopeProvider>) -> TenantScope {
    provider
        .and_then(|p| p.current_scope())
        .unwrap_or_default()
}

/// Inputs of a cacheable read.
#[derive(Debug, Clone, Copy)]
pub struct KeyParts<'a> {
    pub collection: &'a str,
    pub operation: &'a str,
    pub id: Option<&'a str>,
    pub params: Option<&'a Value>,
}

impl<'a> KeyParts<'a> {
    pub fn new(collection: &'a str, operation: &'a str) -> Self {
        Self {
            collection,
            operation,
            id: None,
            params: None,
        }
    }

    pub fn id(mut self, id: Option<&'a str>) -> Self {
        self.id = id;
        self
    }

    pub fn params(mut self, params: Option<&'a Value>) -> Self {
        self.params = params;
        self
    }
}

/// Derives cache keys under one namespace prefix.
#[derive(Clone)]
pub struct KeyGenerator {
    prefix: String,
    scope: Option<Arc<dyn ScopeProvider>>,
}

impl std::fmt::Debug for KeyGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyGenerator")
            .field("prefix", &self.prefix)
            .field("has_scope", &self.scope.is_some())
            .finish()
    }
}

impl KeyGenerator {
    pub fn new(prefix: impl Into<String>, scope: Option<Arc<dyn ScopeProvider>>) -> Self {
        Self {
            prefix: prefix.into(),
            scope,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Scope as seen right now.
    pub fn current_scope(&self) -> TenantScope {
        resolve_scope(self.scope.as_deref())
    }

    /// Generate a key using the ambient scope, resolved at call time.
    pub fn generate(&self, parts: KeyParts<'_>) -> String {
        let scope = self.current_scope();
        generate_key(&self.prefix, &scope, parts)
    }
}

/// Generate a deterministic cache key.
pub fn generate_key(prefix: &str, scope: &TenantScope, parts: KeyParts<'_>) -> String {
    let mut key = format!(
        "{}:{}:{}:{}:{}",
        prefix,
        escape_segment(&scope.user_id),
        escape_segment(&scope.organization_id),
        escape_segment(parts.collection),
        escape_segment(parts.operation),
    );

    if let Some(id) = parts.id {
        key.push(':');
        key.push_str(&escape_segment(id));
    }

    if let Some(params) = parts.params.filter(|p| !p.is_null()) {
        key.push(':');
        key.push_str(&canonical_json(params));
    }

    key
}

/// Serialize a JSON value with object keys sorted at every level.
pub fn canonical_json(value: &Value) -> String {
    serde_json::to_string(&canonicalize(value)).unwrap_or_default()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k.clone(), v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

fn escape_segment(segment: &str) -> String {
    segment.replace('%', "%25").replace(':', "%3A")
}

fn unescape_segment(segment: &str) -> String {
    segment.replace("%3A", ":").replace("%25", "%")
}

/// The scope and collection recovered from a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKey {
    pub user_id: String,
    pub organization_id: String,
    pub collection: String,
    pub operation: String,
}

/// Split a key produced by [`generate_key`] back into its scope parts.
///
/// Returns `None` for keys outside `prefix` or with too few segments.
pub fn parse_key(prefix: &str, key: &str) -> Option<ParsedKey> {
    let rest = key.strip_prefix(prefix)?.strip_prefix(':')?;
    let mut segments = rest.splitn(5, ':');
    let user_id = unescape_segment(segments.next()?);
    let organization_id = unescape_segment(segments.next()?);
    let collection = unescape_segment(segments.next()?);
    let operation = unescape_segment(segments.next()?);

    Some(ParsedKey {
        user_id,
        organization_id,
        collection,
        operation,
    })
}
