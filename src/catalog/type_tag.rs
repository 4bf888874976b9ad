//! Column type classification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed classification of catalog column types.
///
/// `Binary` and `Spatial` are excluded from auditing; every other tag is eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeTag {
    Integer,
    Numeric,
    Boolean,
    Text,
    Uuid,
    Json,
    Temporal,
    Network,
    Array,
    Other,
    Binary,
    Spatial,
}

impl TypeTag {
    /// Classify a catalog type name such as `int4`, `character varying(255)`,
    /// `_text`, `geometry` or `LONGBLOB`.
    pub fn parse(type_name: &str) -> Self {
        let lowered = type_name.trim().to_ascii_lowercase();
        let base = match lowered.find('(') {
            Some(idx) => lowered[..idx].trim_end(),
            None => lowered.as_str(),
        };

        if let Some(element) = base.strip_prefix('_') {
            return Self::array_of(Self::parse(element));
        }
        if let Some(element) = base.strip_suffix("[]") {
            return Self::array_of(Self::parse(element));
        }

        match base {
            "bytea" | "blob" | "tinyblob" | "mediumblob" | "longblob" | "binary" | "varbinary" => {
                TypeTag::Binary
            }
            "geometry" | "geography" | "point" | "line" | "lseg" | "box" | "path" | "polygon"
            | "circle" | "linestring" | "multipoint" | "multilinestring" | "multipolygon"
            | "geometrycollection" => TypeTag::Spatial,
            "int2" | "int4" | "int8" | "smallint" | "integer" | "bigint" | "int" | "serial"
            | "bigserial" | "smallserial" | "oid" => TypeTag::Integer,
            "numeric" | "decimal" | "float4" | "float8" | "real" | "double precision" | "money" => {
                TypeTag::Numeric
            }
            "bool" | "boolean" => TypeTag::Boolean,
            "text" | "varchar" | "character varying" | "bpchar" | "char" | "character" | "name"
            | "citext" => TypeTag::Text,
            "uuid" => TypeTag::Uuid,
            "json" | "jsonb" => TypeTag::Json,
            "date" | "time" | "timetz" | "timestamp" | "timestamptz" | "interval"
            | "time without time zone" | "time with time zone" | "timestamp without time zone"
            | "timestamp with time zone" => TypeTag::Temporal,
            "inet" | "cidr" | "macaddr" | "macaddr8" => TypeTag::Network,
            "array" => TypeTag::Array,
            _ => TypeTag::Other,
        }
    }

    fn array_of(element: TypeTag) -> Self {
        if element.is_excluded() {
            element
        } else {
            TypeTag::Array
        }
    }

    /// Whether columns of this type are kept out of trigger bodies.
    pub fn is_excluded(self) -> bool {
        matches!(self, TypeTag::Binary | TypeTag::Spatial)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeTag::Integer => "integer",
            TypeTag::Numeric => "numeric",
            TypeTag::Boolean => "boolean",
            TypeTag::Text => "text",
            TypeTag::Uuid => "uuid",
            TypeTag::Json => "json",
            TypeTag::Temporal => "temporal",
            TypeTag::Network => "network",
            TypeTag::Array => "array",
            TypeTag::Other => "other",
            TypeTag::Binary => "binary",
            TypeTag::Spatial => "spatial",
        };
        f.write_str(name)
    }
}
