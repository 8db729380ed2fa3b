use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub mod methods;

/// Address of an array element inside an update request or result.
///
/// Index ids are opaque strings minted by the dialog. Plain positions only
/// show up in `initialUpdates`, which the backend computes before any id
/// has been assigned.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash, JsonSchema)]
#[serde(untagged)]
pub enum IndexRef {
    Id(String),
    Position(usize),
}

impl From<&str> for IndexRef {
    fn from(id: &str) -> Self {
        Self::Id(id.to_string())
    }
}

impl From<usize> for IndexRef {
    fn from(position: usize) -> Self {
        Self::Position(position)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct IndexedValue {
    #[serde(default)]
    pub indices: Vec<IndexRef>,
    #[serde(default)]
    pub value: Value,
}

impl IndexedValue {
    pub fn new(indices: Vec<IndexRef>, value: Value) -> Self {
        Self { indices, value }
    }

    pub fn unindexed(value: Value) -> Self {
        Self {
            indices: Vec::new(),
            value,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
#[serde(untagged)]
pub enum Trigger {
    #[serde(rename_all = "camelCase")]
    Id {
        id: String,
        #[serde(default, skip_serializing_if = "is_false")]
        trigger_initially: bool,
    },
    Scope { scope: String },
}

impl Trigger {
    pub fn scope(scope: impl Into<String>) -> Self {
        Self::Scope {
            scope: scope.into(),
        }
    }

    pub fn id(id: impl Into<String>) -> Self {
        Self::Id {
            id: id.into(),
            trigger_initially: false,
        }
    }

    pub fn triggers_initially(&self) -> bool {
        matches!(
            self,
            Self::Id {
                trigger_initially: true,
                ..
            }
        )
    }

    /// The shape sent back to the backend: `{scope}` or `{id}`.
    pub fn descriptor(&self) -> Value {
        match self {
            Self::Id { id, .. } => serde_json::json!({ "id": id }),
            Self::Scope { scope } => serde_json::json!({ "scope": scope }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
pub struct UpdateDescriptor {
    pub trigger: Trigger,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Dependency values keyed by scope, as sent with every update request.
pub type DependencyMap = std::collections::BTreeMap<String, Vec<IndexedValue>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateTarget {
    Id(String),
    Scope(String),
}

/// One item of an update response, classified once at the JSON boundary.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(try_from = "RawUpdateResult", into = "RawUpdateResult")]
pub enum UpdateResult {
    Value {
        scope: String,
        values: Vec<IndexedValue>,
    },
    UiState {
        target: StateTarget,
        provided_option_name: Option<String>,
        values: Vec<IndexedValue>,
    },
}

impl UpdateResult {
    pub fn value(scope: impl Into<String>, values: Vec<IndexedValue>) -> Self {
        Self::Value {
            scope: scope.into(),
            values,
        }
    }
}

/// The update result exactly as the backend spells it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RawUpdateResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provided_option_name: Option<String>,
    #[serde(default)]
    pub values: Vec<IndexedValue>,
}

impl TryFrom<RawUpdateResult> for UpdateResult {
    type Error = String;

    fn try_from(raw: RawUpdateResult) -> std::result::Result<Self, Self::Error> {
        let RawUpdateResult {
            scope,
            id,
            provided_option_name,
            values,
        } = raw;
        match (id, scope, provided_option_name) {
            (Some(id), _, provided_option_name) => Ok(Self::UiState {
                target: StateTarget::Id(id),
                provided_option_name,
                values,
            }),
            (None, Some(scope), Some(name)) => Ok(Self::UiState {
                target: StateTarget::Scope(scope),
                provided_option_name: Some(name),
                values,
            }),
            (None, Some(scope), None) => Ok(Self::Value { scope, values }),
            (None, None, _) => Err("update result has neither an id nor a scope".to_string()),
        }
    }
}

impl From<UpdateResult> for RawUpdateResult {
    fn from(result: UpdateResult) -> Self {
        match result {
            UpdateResult::Value { scope, values } => Self {
                scope: Some(scope),
                id: None,
                provided_option_name: None,
                values,
            },
            UpdateResult::UiState {
                target,
                provided_option_name,
                values,
            } => {
                let (id, scope) = match target {
                    StateTarget::Id(id) => (Some(id), None),
                    StateTarget::Scope(scope) => (None, Some(scope)),
                };
                Self {
                    scope,
                    id,
                    provided_option_name,
                    values,
                }
            }
        }
    }
}

/// Discriminated result of every backend call.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RpcResponse<T> {
    Success {
        #[serde(default)]
        result: T,
        #[serde(
            default,
            skip_serializing_if = "Vec::is_empty",
            deserialize_with = "one_or_many"
        )]
        message: Vec<String>,
    },
    Fail {
        #[serde(default, deserialize_with = "one_or_many")]
        message: Vec<String>,
    },
}

impl<T> RpcResponse<T> {
    pub fn success(result: T) -> Self {
        Self::Success {
            result,
            message: Vec::new(),
        }
    }

    pub fn fail(messages: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::Fail {
            message: messages.into_iter().map(Into::into).collect(),
        }
    }
}

/// Answer of a flow-variable override request. A missing `result` means the
/// variable could not be resolved; any present value, `null` included, is
/// the resolved value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum OverrideValue {
    #[default]
    Undefined,
    Defined(Value),
}

impl OverrideValue {
    pub fn into_option(self) -> Option<Value> {
        match self {
            Self::Undefined => None,
            Self::Defined(value) => Some(value),
        }
    }
}

impl<'de> Deserialize<'de> for OverrideValue {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(Self::Defined)
    }
}

impl Serialize for OverrideValue {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::Undefined => serializer.serialize_unit(),
            Self::Defined(value) => value.serialize(serializer),
        }
    }
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Nothing(()),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(message) => vec![message],
        OneOrMany::Many(messages) => messages,
        OneOrMany::Nothing(()) => Vec::new(),
    })
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FlowVariableSetting {
    #[serde(default)]
    pub controlling_flow_variable_name: Option<String>,
    #[serde(default)]
    pub exposed_flow_variable_name: Option<String>,
    #[serde(default)]
    pub controlling_flow_variable_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controlling_flow_variable_flawed: Option<bool>,
}

impl FlowVariableSetting {
    pub fn controlled_by(name: impl Into<String>) -> Self {
        Self {
            controlling_flow_variable_name: Some(name.into()),
            controlling_flow_variable_available: true,
            ..Self::default()
        }
    }

    pub fn is_controlled(&self) -> bool {
        self.controlling_flow_variable_name.is_some()
    }
}

pub type FlowVariableSettings = std::collections::BTreeMap<String, FlowVariableSetting>;

/// Everything the backend hands over once per dialog open.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct InitialPayload {
    pub data: Value,
    #[serde(default)]
    pub schema: Value,
    #[serde(default)]
    pub ui_schema: Value,
    #[serde(default, rename = "globalUpdates")]
    pub global_updates: Vec<UpdateDescriptor>,
    #[serde(default, rename = "initialUpdates")]
    pub initial_updates: Vec<UpdateResult>,
    #[serde(default, rename = "flowVariableSettings")]
    pub flow_variable_settings: FlowVariableSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persist: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Error,
    Warn,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
pub struct Alert {
    #[serde(rename = "type")]
    pub kind: AlertType,
    pub message: String,
}

impl Alert {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: AlertType::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ValidationKind {
    External,
    Custom,
}

impl ValidationKind {
    pub fn method(self) -> &'static str {
        match self {
            Self::External => methods::PERFORM_EXTERNAL_VALIDATION,
            Self::Custom => methods::PERFORM_CUSTOM_VALIDATION,
        }
    }
}

/// JSON schema of one raw update result, for backend authors.
pub fn update_result_schema() -> schemars::Schema {
    schemars::schema_for!(RawUpdateResult)
}

pub fn serialize_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(Into::into)
}

const fn is_false(value: &bool) -> bool {
    !*value
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn classifies_update_results_at_the_boundary() {
        let parsed: Vec<UpdateResult> = serde_json::from_value(json!([
            {"scope": "#/properties/model/properties/a", "values": [{"indices": [], "value": 1}]},
            {"scope": "#/properties/model/properties/b", "providedOptionName": "possibleValues", "values": []},
            {"id": "choices", "values": [{"indices": ["x1"], "value": ["a"]}]}
        ]))
        .expect("parse");

        assert_eq!(
            parsed[0],
            UpdateResult::value(
                "#/properties/model/properties/a",
                vec![IndexedValue::unindexed(json!(1))]
            )
        );
        assert_eq!(
            parsed[1],
            UpdateResult::UiState {
                target: StateTarget::Scope("#/properties/model/properties/b".into()),
                provided_option_name: Some("possibleValues".into()),
                values: vec![],
            }
        );
        assert_eq!(
            parsed[2],
            UpdateResult::UiState {
                target: StateTarget::Id("choices".into()),
                provided_option_name: None,
                values: vec![IndexedValue::new(vec!["x1".into()], json!(["a"]))],
            }
        );
    }

    #[test]
    fn rejects_update_results_without_target() {
        let parsed = serde_json::from_value::<UpdateResult>(json!({"values": []}));
        assert!(parsed.is_err());
    }

    #[test]
    fn index_refs_keep_ids_and_positions_apart() {
        let refs: Vec<IndexRef> = serde_json::from_value(json!(["abc", 3])).expect("parse");
        assert_eq!(refs, vec![IndexRef::Id("abc".into()), IndexRef::Position(3)]);
    }

    #[test]
    fn rpc_failure_accepts_single_message() {
        let parsed: RpcResponse<Vec<UpdateResult>> =
            serde_json::from_value(json!({"state": "FAIL", "message": "boom"})).expect("parse");
        assert_eq!(parsed, RpcResponse::fail(["boom"]));
    }

    #[test]
    fn rpc_success_without_result_is_undefined() {
        let parsed: RpcResponse<OverrideValue> =
            serde_json::from_value(json!({"state": "SUCCESS"})).expect("parse");
        assert_eq!(parsed, RpcResponse::success(OverrideValue::Undefined));
    }

    #[test]
    fn rpc_success_with_null_result_is_defined() {
        let parsed: RpcResponse<OverrideValue> =
            serde_json::from_value(json!({"state": "SUCCESS", "result": null})).expect("parse");
        assert_eq!(parsed, RpcResponse::success(OverrideValue::Defined(Value::Null)));
    }

    #[test]
    fn trigger_descriptor_drops_initial_flag() {
        let trigger: Trigger =
            serde_json::from_value(json!({"id": "button", "triggerInitially": true})).expect("parse");
        assert!(trigger.triggers_initially());
        assert_eq!(trigger.descriptor(), json!({"id": "button"}));
    }

    #[test]
    fn initial_payload_reads_camel_case_sections() {
        let payload: InitialPayload = serde_json::from_value(json!({
            "data": {"model": {}},
            "globalUpdates": [{"trigger": {"scope": "#/properties/model/properties/a"}, "dependencies": []}],
            "flowVariableSettings": {"model.a": {"controllingFlowVariableName": "var"}}
        }))
        .expect("parse");
        assert_eq!(payload.global_updates.len(), 1);
        assert!(payload.flow_variable_settings["model.a"].is_controlled());
        assert!(payload.initial_updates.is_empty());
    }
}
