#[derive(Debug, Default, Clone, PartialEq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TypeConfig {
    /// The fields composing the id of this type. Falls back to the default keys when unset.
    pub keys: Option<Vec<String>>,
}
