//! C4 — per-entity EDM (Entity Data Model) registry.
//!
//! `spec.md` §4.4: on a cache miss, `entityName` is split on `.` into
//! `(schema, table)` (schema defaults to `dbo`), bracket-quoting is
//! stripped from both halves, and a synthetic model — namespace
//! `Data.{schema}`, entity type `{table}` with a synthetic `Int32` key
//! `ID`, a default container, an entity set named `{table}` — is built and
//! cached case-insensitively. The registry is monotonic: entries are added,
//! never evicted, for the life of the process (`spec.md` §3 invariant v).

use std::sync::Arc;

use dashmap_like::CaseInsensitiveCache;
use gateway_core::GatewayError;

/// The synthetic EDM for one entity. Deliberately carries no column list —
/// OData parsing tolerates any property name; [`crate::odata`] maps
/// alias → db column afterwards using the endpoint's `ColumnMap`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdmModel {
	pub namespace: String,
	pub entity_type: String,
	pub entity_set: String,
	pub key_property: String,
}

impl EdmModel {
	fn synthesize(schema: &str, table: &str) -> Self {
		EdmModel {
			namespace: format!("Data.{schema}"),
			entity_type: table.to_string(),
			entity_set: table.to_string(),
			key_property: "ID".to_string(),
		}
	}
}

fn strip_brackets(part: &str) -> &str {
	part.strip_prefix('[').and_then(|s| s.strip_suffix(']')).unwrap_or(part)
}

/// Splits `entityName` into `(schema, table)`, defaulting schema to `dbo`
/// and stripping `[bracket]` quoting from both halves.
pub fn split_entity_name(entity_name: &str) -> (String, String) {
	match entity_name.split_once('.') {
		Some((schema, table)) => (strip_brackets(schema).to_string(), strip_brackets(table).to_string()),
		None => ("dbo".to_string(), strip_brackets(entity_name).to_string()),
	}
}

/// Process-wide, init-once EDM cache. The first writer for a given
/// (case-insensitive) entity name wins; concurrent writers may do redundant
/// synthesis work but always agree on the final value, since the model is a
/// pure function of the entity name (`spec.md` §5 "idempotent build").
pub struct EdmRegistry {
	models: CaseInsensitiveCache<Arc<EdmModel>>,
}

impl EdmRegistry {
	pub fn new() -> Self {
		EdmRegistry {
			models: CaseInsensitiveCache::new(),
		}
	}

	/// `getModel(entityName) → Model`. Returns the same `Arc` on every call
	/// for a given entity name (case-insensitive), satisfying `spec.md` §8
	/// scenario 8 "getModel twice returns the same model instance".
	pub fn get_model(&self, entity_name: &str) -> Arc<EdmModel> {
		self.models.get_or_insert_with(entity_name, || {
			let (schema, table) = split_entity_name(entity_name);
			Arc::new(EdmModel::synthesize(&schema, &table))
		})
	}

	/// `parseMetadata(csdlXml) → Model?`. Externally supplied CSDL is a
	/// capability the core carries (`spec.md` §9 "CSDL-XML-based metadata
	/// parsing") but doesn't need for the synthetic fast path; a mature EDM/
	/// CSDL parser is outside this ecosystem's default toolkit, so this
	/// accepts only the trivial single-entity-type shape `<EntityType
	/// Name="..." Namespace="..."/>` and logs+returns `None` on anything else.
	pub fn parse_metadata(&self, csdl_xml: &str) -> Option<Arc<EdmModel>> {
		let name = extract_attr(csdl_xml, "EntityType", "Name")?;
		let namespace = extract_attr(csdl_xml, "Schema", "Namespace").unwrap_or_else(|| "Data.dbo".to_string());
		let model = Arc::new(EdmModel {
			namespace,
			entity_type: name.clone(),
			entity_set: name.clone(),
			key_property: "ID".to_string(),
		});
		Some(self.models.get_or_insert_with(&name, || model.clone()))
	}
}

impl Default for EdmRegistry {
	fn default() -> Self {
		Self::new()
	}
}

fn extract_attr(xml: &str, tag: &str, attr: &str) -> Option<String> {
	let tag_start = xml.find(&format!("<{tag}"))?;
	let tag_end = xml[tag_start..].find('>').map(|i| tag_start + i)?;
	let element = &xml[tag_start..tag_end];
	let attr_marker = format!("{attr}=\"");
	let attr_start = element.find(&attr_marker)? + attr_marker.len();
	let attr_end = element[attr_start..].find('"').map(|i| attr_start + i)?;
	Some(element[attr_start..attr_end].to_string())
}

/// Builds an [`EdmRegistry`] and returns an error if construction itself
/// cannot succeed. Kept as a fallible constructor so the router's startup
/// path has a single place to report `spec.md` §7 "EDM build failure".
pub fn build_registry() -> Result<EdmRegistry, GatewayError> {
	Ok(EdmRegistry::new())
}

/// A tiny case-insensitive, write-once-per-key cache. Lives in its own
/// module-private namespace because it's shared shape (not behaviour) with
/// the host-pattern cache in [`crate::urlallowlist`], but the key normalisation
/// rule here (lower-case) is specific to entity names.
mod dashmap_like {
	use std::collections::HashMap;
	use std::sync::RwLock;

	pub struct CaseInsensitiveCache<V> {
		inner: RwLock<HashMap<String, V>>,
	}

	impl<V: Clone> CaseInsensitiveCache<V> {
		pub fn new() -> Self {
			CaseInsensitiveCache {
				inner: RwLock::new(HashMap::new()),
			}
		}

		pub fn get_or_insert_with(&self, key: &str, build: impl FnOnce() -> V) -> V {
			let normalized = key.to_ascii_lowercase();
			if let Some(existing) = self.inner.read().unwrap().get(&normalized) {
				return existing.clone();
			}
			let value = build();
			// First writer wins: if another thread raced us, keep its value so
			// every caller observes the same instance from then on.
			let mut guard = self.inner.write().unwrap();
			guard.entry(normalized).or_insert(value).clone()
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn splits_schema_and_table_with_default_schema() {
		assert_eq!(split_entity_name("dbo.Items"), ("dbo".to_string(), "Items".to_string()));
		assert_eq!(split_entity_name("Items"), ("dbo".to_string(), "Items".to_string()));
	}

	#[test]
	fn strips_bracket_quoting() {
		assert_eq!(split_entity_name("[erp].[Items]"), ("erp".to_string(), "Items".to_string()));
	}

	#[test]
	fn get_model_returns_same_instance_across_calls() {
		let registry = EdmRegistry::new();
		let first = registry.get_model("dbo.Items");
		let second = registry.get_model("DBO.ITEMS");
		assert!(Arc::ptr_eq(&first, &second));
		assert_eq!(first.entity_set, "Items");
		assert_eq!(first.namespace, "Data.dbo");
		assert_eq!(first.key_property, "ID");
	}

	#[test]
	fn parse_metadata_invalid_xml_returns_none() {
		let registry = EdmRegistry::new();
		assert!(registry.parse_metadata("<not-edm/>").is_none());
	}

	#[test]
	fn parse_metadata_extracts_entity_type_name() {
		let registry = EdmRegistry::new();
		let model = registry
			.parse_metadata(r#"<Schema Namespace="Data.erp"><EntityType Name="Widgets"/></Schema>"#)
			.expect("parses");
		assert_eq!(model.entity_type, "Widgets");
		assert_eq!(model.namespace, "Data.erp");
	}
}
