//! RPC method names understood by the dialog backend.

pub const UPDATE: &str = "settings.update2";
pub const UPDATE_WITH_SETTINGS_ID: &str = "settings.update2WithSettingsId";
pub const PERFORM_EXTERNAL_VALIDATION: &str = "settings.performExternalValidation";
pub const PERFORM_CUSTOM_VALIDATION: &str = "settings.performCustomValidation";
pub const AVAILABLE_FLOW_VARIABLES: &str = "flowVariables.getAvailableFlowVariables";
pub const FLOW_VARIABLE_OVERRIDE_VALUE: &str = "flowVariables.getFlowVariableOverrideValue";
