//! Show styles: the source and output layers a show's pieces live on.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::ids::{ShowStyleBaseId, ShowStyleVariantId};
use crate::overrides::{apply_and_validate_overrides, ObjectWithOverrides};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceLayerType {
    #[default]
    Unknown,
    Camera,
    Vt,
    Remote,
    Script,
    Graphics,
    Split,
    Audio,
    Transition,
    Lights,
    Local,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceLayer {
    pub name: String,
    #[serde(default)]
    pub rank: i32,
    #[serde(default)]
    pub layer_type: SourceLayerType,
    /// Source layers in the same group pre-empt each other.
    #[serde(default)]
    pub exclusive_group: Option<String>,
    #[serde(default)]
    pub is_hidden: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputLayer {
    pub name: String,
    #[serde(default)]
    pub rank: i32,
    #[serde(default)]
    pub is_pgm: bool,
}

pub type SourceLayers = BTreeMap<String, SourceLayer>;
pub type OutputLayers = BTreeMap<String, OutputLayer>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowStyleBase {
    pub id: ShowStyleBaseId,
    pub name: String,
    #[serde(default)]
    pub source_layers: ObjectWithOverrides<SourceLayers>,
    #[serde(default)]
    pub output_layers: ObjectWithOverrides<OutputLayers>,
    #[serde(default)]
    pub blueprint_config: ObjectWithOverrides<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowStyleVariant {
    pub id: ShowStyleVariantId,
    pub show_style_base_id: ShowStyleBaseId,
    pub name: String,
    #[serde(default)]
    pub blueprint_config: ObjectWithOverrides<Value>,
}

/// A show style base and variant with all overrides applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedShowStyle {
    pub base_id: ShowStyleBaseId,
    pub variant_id: ShowStyleVariantId,
    pub source_layers: SourceLayers,
    pub output_layers: OutputLayers,
    pub blueprint_config: Value,
}

/// Apply base and variant overrides. The variant's blueprint config is
/// merged key by key over the base's.
pub fn resolve_show_style(
    base: &ShowStyleBase,
    variant: &ShowStyleVariant,
) -> Result<ResolvedShowStyle, CoreError> {
    if variant.show_style_base_id != base.id {
        return Err(CoreError::Conflict(format!(
            "Variant {} does not belong to show style base {}",
            variant.id, base.id
        )));
    }

    let mut blueprint_config = apply_and_validate_overrides(&base.blueprint_config)?.obj;
    let variant_config = apply_and_validate_overrides(&variant.blueprint_config)?.obj;
    if let (Value::Object(target), Value::Object(extra)) = (&mut blueprint_config, variant_config)
    {
        target.extend(extra);
    }

    Ok(ResolvedShowStyle {
        base_id: base.id.clone(),
        variant_id: variant.id.clone(),
        source_layers: apply_and_validate_overrides(&base.source_layers)?.obj,
        output_layers: apply_and_validate_overrides(&base.output_layers)?.obj,
        blueprint_config,
    })
}
