//! Per-resource attribute contracts.
//!
//! A [`ResourceSchema`] is the declared configuration surface of one
//! resource kind: for each attribute a [`AttributeDescriptor`] records its
//! semantic type, cardinality, recreate rules, validator, diff-suppression
//! chain, and normalizer. The schema also carries the recompute triggers,
//! the customize-diff chain, per-operation timeouts, and the
//! preview-feature flag the dispatcher enforces.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::reconcile::ReconcilePlan;
use crate::suppress::{RecreateFn, SuppressFn, SuppressionChain};

/// The semantic type of an attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum SemanticType {
    /// Free text.
    Text,
    /// 64-bit integer; may use the [`crate::value::UNSET_INT`] sentinel.
    Integer,
    /// 64-bit float.
    Float,
    /// Tri-state boolean {true, false, default}.
    TriStateBool,
    /// Ordered list of elements of a single type.
    List(Box<SemanticType>),
    /// Unordered set of elements of a single type, compared as a multiset.
    Set(Box<SemanticType>),
    /// A nested record, flattened to `prefix.index.subfield` for diffing.
    Record(Vec<(String, SemanticType)>),
}

impl SemanticType {
    /// Create a list type.
    pub fn list(element: SemanticType) -> Self {
        Self::List(Box::new(element))
    }

    /// Create a set type.
    pub fn set(element: SemanticType) -> Self {
        Self::Set(Box::new(element))
    }

    /// Human-readable name used in validation diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::TriStateBool => "tri-state boolean",
            Self::List(_) => "list",
            Self::Set(_) => "set",
            Self::Record(_) => "record",
        }
    }
}

/// A per-attribute validation hook. Returns a user-facing message on
/// rejection; the caller attaches the attribute path.
pub type ValidatorFn = fn(&Value) -> Result<(), String>;

/// A per-attribute normalizer applied before comparison.
pub type NormalizerFn = fn(&Value) -> Value;

/// One transformation in the customize-diff chain. Transformations run in
/// order after field-level planning, e.g. to widen a single-field change
/// into a whole-record recreation.
pub type DiffTransformFn = fn(&ResourceSchema, ReconcilePlan) -> ReconcilePlan;

/// Declares that an observer attribute must be re-read from the remote
/// whenever any of its trigger attributes changes in the plan.
#[derive(Debug, Clone)]
pub struct RecomputeRule {
    /// The computed attribute to mark stale.
    pub observer: String,
    /// The config attributes whose change triggers the recompute.
    pub triggers: Vec<String>,
}

/// Describes a single attribute in a resource schema.
#[derive(Debug, Clone)]
pub struct AttributeDescriptor {
    /// The semantic type of the attribute.
    pub semantic_type: SemanticType,
    /// The attribute is required in configuration.
    pub required: bool,
    /// The attribute is optional in configuration.
    pub optional: bool,
    /// The attribute is computed from remote state (read-only).
    pub computed: bool,
    /// Any change to this attribute forces resource replacement.
    pub force_new: bool,
    /// Conditional replacement: evaluated on a detected change.
    pub recreate_if: Option<RecreateFn>,
    /// The sentinel encoding "user did not set this; take the Service
    /// default" (e.g. `-1` for integers, `"default"` for tri-states).
    pub sentinel: Option<Value>,
    /// Where the Service offers no UNSET, the documented default sent via
    /// SET instead. `None` means UNSET is supported.
    pub unset_fallback: Option<Value>,
    /// Validation hook run against config values.
    pub validator: Option<ValidatorFn>,
    /// Diff-suppression rules, OR-reduced.
    pub suppress: SuppressionChain,
    /// Normalizer applied to both sides before comparison.
    pub normalizer: Option<NormalizerFn>,
    /// A change to this attribute is applied as a rename, issued before
    /// any other alter.
    pub renames_object: bool,
    /// The alter flow this attribute belongs to; `None` means the main
    /// flow. Fields in the same flow are altered in one request.
    pub flow: Option<String>,
    /// Human-readable description.
    pub description: Option<String>,
}

impl AttributeDescriptor {
    /// Create a descriptor with the given semantic type and no flags set.
    pub fn new(semantic_type: SemanticType) -> Self {
        Self {
            semantic_type,
            required: false,
            optional: false,
            computed: false,
            force_new: false,
            recreate_if: None,
            sentinel: None,
            unset_fallback: None,
            validator: None,
            suppress: SuppressionChain::none(),
            normalizer: None,
            renames_object: false,
            flow: None,
            description: None,
        }
    }

    /// A text attribute.
    pub fn text() -> Self {
        Self::new(SemanticType::Text)
    }

    /// An integer attribute using the `-1` unset sentinel.
    pub fn integer() -> Self {
        Self::new(SemanticType::Integer).with_sentinel(Value::from(crate::value::UNSET_INT))
    }

    /// A float attribute.
    pub fn float() -> Self {
        Self::new(SemanticType::Float)
    }

    /// A tri-state boolean attribute; `"default"` is its unset sentinel.
    pub fn tri_state() -> Self {
        Self::new(SemanticType::TriStateBool).with_sentinel(Value::from("default"))
    }

    /// An unordered set of text elements.
    pub fn text_set() -> Self {
        Self::new(SemanticType::set(SemanticType::Text))
    }

    /// Mark as required in configuration.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Mark as optional in configuration.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Mark as computed (read-only, populated by the drift reader).
    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    /// Any change forces replacement.
    pub fn with_force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    /// Conditional replacement predicate.
    pub fn with_recreate_if(mut self, predicate: RecreateFn) -> Self {
        self.recreate_if = Some(predicate);
        self
    }

    /// Set the unset sentinel value.
    pub fn with_sentinel(mut self, sentinel: Value) -> Self {
        self.sentinel = Some(sentinel);
        self
    }

    /// Declare that the Service has no UNSET for this field and record the
    /// documented default to SET instead.
    pub fn with_unset_fallback(mut self, fallback: Value) -> Self {
        self.unset_fallback = Some(fallback);
        self
    }

    /// Attach a validation hook.
    pub fn with_validator(mut self, validator: ValidatorFn) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Append a diff-suppression rule.
    pub fn with_suppressor(mut self, rule: SuppressFn) -> Self {
        self.suppress = self.suppress.or(rule);
        self
    }

    /// Attach a comparison normalizer.
    pub fn with_normalizer(mut self, normalizer: NormalizerFn) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    /// A change to this attribute renames the object.
    pub fn renaming(mut self) -> Self {
        self.renames_object = true;
        self
    }

    /// Assign the attribute to a named alter flow.
    pub fn in_flow(mut self, flow: impl Into<String>) -> Self {
        self.flow = Some(flow.into());
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Whether `value` is this attribute's unset sentinel (or absent).
    pub fn is_unset(&self, value: Option<&Value>) -> bool {
        match value {
            None | Some(Value::Null) => true,
            Some(v) => {
                if let Some(sentinel) = &self.sentinel {
                    if v == sentinel {
                        return true;
                    }
                }
                // An empty string behaves as unset for text fields.
                matches!(
                    (&self.semantic_type, v),
                    (SemanticType::Text, Value::String(s)) if s.is_empty()
                )
            }
        }
    }

    /// Normalize a value for comparison.
    pub fn normalize(&self, value: &Value) -> Value {
        match self.normalizer {
            Some(normalizer) => normalizer(value),
            None => value.clone(),
        }
    }
}

/// The lifecycle operation being dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Create a new object.
    Create,
    /// Read remote state back.
    Read,
    /// Alter an existing object in place.
    Update,
    /// Drop the object.
    Delete,
    /// Adopt an existing object into state.
    Import,
}

impl Operation {
    /// The lower-case name used in tracking markers and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Import => "import",
        }
    }
}

/// Per-operation deadlines enforced by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationTimeouts {
    /// Create deadline.
    pub create: Duration,
    /// Read deadline.
    pub read: Duration,
    /// Update deadline.
    pub update: Duration,
    /// Delete deadline.
    pub delete: Duration,
    /// Import deadline.
    pub import: Duration,
}

impl Default for OperationTimeouts {
    fn default() -> Self {
        let twenty_minutes = Duration::from_secs(20 * 60);
        Self {
            create: twenty_minutes,
            read: twenty_minutes,
            update: twenty_minutes,
            delete: twenty_minutes,
            import: twenty_minutes,
        }
    }
}

impl OperationTimeouts {
    /// Deadlines for resources whose create/update may execute unbounded
    /// remote work (60 minutes instead of 20).
    pub fn unbounded_execute() -> Self {
        let sixty_minutes = Duration::from_secs(60 * 60);
        Self {
            create: sixty_minutes,
            update: sixty_minutes,
            ..Self::default()
        }
    }

    /// The deadline for one operation.
    pub fn for_operation(&self, operation: Operation) -> Duration {
        match operation {
            Operation::Create => self.create,
            Operation::Read => self.read,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
            Operation::Import => self.import,
        }
    }
}

/// The attribute contract of one resource kind.
#[derive(Debug, Clone, Default)]
pub struct ResourceSchema {
    /// Schema version, for state upgrades.
    pub version: u64,
    /// Attribute descriptors keyed by name.
    pub attributes: BTreeMap<String, AttributeDescriptor>,
    /// Compute-if-changed rules.
    pub recompute: Vec<RecomputeRule>,
    /// Customize-diff chain, run in order after field-level planning.
    pub diff_transforms: Vec<DiffTransformFn>,
    /// Per-operation deadlines.
    pub timeouts: OperationTimeouts,
    /// The resource is gated behind a preview-feature flag.
    pub preview: bool,
}

impl ResourceSchema {
    /// Create an empty schema at the given version.
    pub fn v(version: u64) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    /// Add an attribute descriptor.
    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        descriptor: AttributeDescriptor,
    ) -> Self {
        self.attributes.insert(name.into(), descriptor);
        self
    }

    /// Declare a compute-if-changed rule.
    pub fn with_recompute(
        mut self,
        observer: impl Into<String>,
        triggers: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.recompute.push(RecomputeRule {
            observer: observer.into(),
            triggers: triggers.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Append a customize-diff transformation.
    pub fn with_diff_transform(mut self, transform: DiffTransformFn) -> Self {
        self.diff_transforms.push(transform);
        self
    }

    /// Replace the operation timeouts.
    pub fn with_timeouts(mut self, timeouts: OperationTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Gate the resource behind the preview flag.
    pub fn preview(mut self) -> Self {
        self.preview = true;
        self
    }

    /// Look up a descriptor by attribute name.
    pub fn attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.get(name)
    }

    /// The attribute flagged as renaming the object, if any.
    pub fn rename_attribute(&self) -> Option<(&str, &AttributeDescriptor)> {
        self.attributes
            .iter()
            .find(|(_, d)| d.renames_object)
            .map(|(name, d)| (name.as_str(), d))
    }

    /// Observers whose triggers intersect the changed attribute names.
    /// Record attributes report changes under `name.index.subfield` keys,
    /// so a trigger also matches any leaf beneath it.
    pub fn stale_observers(&self, changed: &[String]) -> Vec<String> {
        self.recompute
            .iter()
            .filter(|rule| {
                rule.triggers
                    .iter()
                    .any(|t| changed.iter().any(|c| trigger_matches(t, c)))
            })
            .map(|rule| rule.observer.clone())
            .collect()
    }
}

/// Whether a changed attribute name falls under a trigger: either the
/// trigger itself or a flattened leaf beneath it.
pub(crate) fn trigger_matches(trigger: &str, changed: &str) -> bool {
    changed == trigger
        || (changed.len() > trigger.len()
            && changed.starts_with(trigger)
            && changed.as_bytes()[trigger.len()] == b'.')
}

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    /// Prevents the operation from completing.
    Error,
    /// Surfaced to the user without failing the operation.
    Warning,
}

/// A diagnostic message surfaced to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The severity of the diagnostic.
    pub severity: DiagnosticSeverity,
    /// A short summary of the issue.
    pub summary: String,
    /// A detailed description of the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// The attribute path where the issue occurred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    /// Create an error diagnostic.
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Create a warning diagnostic.
    pub fn warning(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Add detail to this diagnostic.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Set the attribute path for this diagnostic.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Whether this diagnostic is an error.
    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suppress::{enum_normalization, recreate_on_empty_string};
    use serde_json::json;

    #[test]
    fn descriptor_builders_compose() {
        let attr = AttributeDescriptor::text()
            .optional()
            .with_suppressor(enum_normalization)
            .with_recreate_if(recreate_on_empty_string)
            .in_flow("oauth")
            .with_description("OAuth client id");

        assert!(attr.optional);
        assert!(!attr.required);
        assert!(!attr.suppress.is_empty());
        assert!(attr.recreate_if.is_some());
        assert_eq!(attr.flow.as_deref(), Some("oauth"));
    }

    #[test]
    fn integer_descriptor_carries_the_unset_sentinel() {
        let attr = AttributeDescriptor::integer().optional();
        assert!(attr.is_unset(Some(&json!(-1))));
        assert!(attr.is_unset(None));
        assert!(!attr.is_unset(Some(&json!(0))));
    }

    #[test]
    fn tri_state_descriptor_treats_default_as_unset() {
        let attr = AttributeDescriptor::tri_state().optional();
        assert!(attr.is_unset(Some(&json!("default"))));
        assert!(!attr.is_unset(Some(&json!("false"))));
    }

    #[test]
    fn empty_string_is_unset_for_text_only() {
        let text = AttributeDescriptor::text().optional();
        assert!(text.is_unset(Some(&json!(""))));
        assert!(!text.is_unset(Some(&json!("x"))));
    }

    #[test]
    fn schema_builder_and_lookup() {
        let schema = ResourceSchema::v(2)
            .with_attribute("name", AttributeDescriptor::text().required().renaming())
            .with_attribute("comment", AttributeDescriptor::text().optional())
            .with_recompute("size_bytes", ["warehouse_size"]);

        assert_eq!(schema.version, 2);
        assert!(schema.attribute("comment").is_some());
        let (rename_name, _) = schema.rename_attribute().unwrap();
        assert_eq!(rename_name, "name");
    }

    #[test]
    fn stale_observers_match_on_any_trigger() {
        let schema = ResourceSchema::v(0)
            .with_recompute("state", ["enabled", "schedule"])
            .with_recompute("size_bytes", ["warehouse_size"]);

        let stale = schema.stale_observers(&["schedule".to_string()]);
        assert_eq!(stale, vec!["state".to_string()]);
        assert!(schema.stale_observers(&["comment".to_string()]).is_empty());
    }

    #[test]
    fn triggers_match_record_leaves_but_not_name_prefixes() {
        let schema = ResourceSchema::v(0).with_recompute("endpoint", ["targets"]);
        assert_eq!(
            schema.stale_observers(&["targets.0.port".to_string()]),
            vec!["endpoint".to_string()]
        );
        // "targets_extra" shares a prefix but is a different attribute.
        assert!(schema
            .stale_observers(&["targets_extra".to_string()])
            .is_empty());
    }

    #[test]
    fn timeouts_default_to_twenty_minutes() {
        let t = OperationTimeouts::default();
        assert_eq!(t.for_operation(Operation::Create), Duration::from_secs(1200));
        assert_eq!(t.for_operation(Operation::Delete), Duration::from_secs(1200));

        let unbounded = OperationTimeouts::unbounded_execute();
        assert_eq!(
            unbounded.for_operation(Operation::Update),
            Duration::from_secs(3600)
        );
        assert_eq!(
            unbounded.for_operation(Operation::Read),
            Duration::from_secs(1200)
        );
    }

    #[test]
    fn diagnostic_builders() {
        let diag = Diagnostic::warning("object vanished")
            .with_detail("removed outside of management")
            .with_attribute("name");
        assert!(!diag.is_error());
        assert_eq!(diag.attribute.as_deref(), Some("name"));
    }
}
