//! Structured-data marshalling with overridable JSON/XML functions.
//!
//! Structured values travel through the pipeline as a [`serde_json::Value`]
//! document. Overrides work on that document model; the built-in codecs are
//! `serde_json` and `quick_xml`.

use crate::error::{BoxError, HttpError};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Marshal override: document → wire bytes.
pub type MarshalFn = Arc<dyn Fn(&Value) -> Result<Vec<u8>, BoxError> + Send + Sync>;

/// Unmarshal override: wire bytes → document.
pub type UnmarshalFn = Arc<dyn Fn(&[u8]) -> Result<Value, BoxError> + Send + Sync>;

/// Set of optional marshal/unmarshal overrides.
///
/// Unset slots fall back (see [`Codecs::or`]) and finally to the built-in codecs.
#[derive(Clone, Default)]
pub struct Codecs {
    pub json_marshal: Option<MarshalFn>,
    pub json_unmarshal: Option<UnmarshalFn>,
    pub xml_marshal: Option<MarshalFn>,
    pub xml_unmarshal: Option<UnmarshalFn>,
}

impl Codecs {
    /// Fill every unset slot of `self` from `fallback`.
    #[must_use]
    pub fn or(&self, fallback: &Codecs) -> Codecs {
        Codecs {
            json_marshal: self
                .json_marshal
                .clone()
                .or_else(|| fallback.json_marshal.clone()),
            json_unmarshal: self
                .json_unmarshal
                .clone()
                .or_else(|| fallback.json_unmarshal.clone()),
            xml_marshal: self
                .xml_marshal
                .clone()
                .or_else(|| fallback.xml_marshal.clone()),
            xml_unmarshal: self
                .xml_unmarshal
                .clone()
                .or_else(|| fallback.xml_unmarshal.clone()),
        }
    }

    pub(crate) fn marshal_json(&self, value: &Value) -> Result<Vec<u8>, HttpError> {
        match &self.json_marshal {
            Some(marshal) => marshal(value).map_err(HttpError::Marshal),
            None => Ok(serde_json::to_vec(value)?),
        }
    }

    pub(crate) fn marshal_xml(&self, value: &Value, root: &str) -> Result<Vec<u8>, HttpError> {
        match &self.xml_marshal {
            Some(marshal) => marshal(value).map_err(HttpError::Marshal),
            None => Ok(quick_xml::se::to_string_with_root(root, value)?.into_bytes()),
        }
    }

    pub(crate) fn unmarshal_json<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, HttpError> {
        match &self.json_unmarshal {
            Some(unmarshal) => {
                let document = unmarshal(bytes).map_err(HttpError::Marshal)?;
                Ok(serde_json::from_value(document)?)
            }
            None => Ok(serde_json::from_slice(bytes)?),
        }
    }

    pub(crate) fn unmarshal_xml<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, HttpError> {
        match &self.xml_unmarshal {
            Some(unmarshal) => {
                let document = unmarshal(bytes).map_err(HttpError::Marshal)?;
                Ok(serde_json::from_value(document)?)
            }
            None => {
                let text = String::from_utf8_lossy(bytes);
                Ok(quick_xml::de::from_str(&text)?)
            }
        }
    }
}

impl fmt::Debug for Codecs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codecs")
            .field("json_marshal", &self.json_marshal.is_some())
            .field("json_unmarshal", &self.json_unmarshal.is_some())
            .field("xml_marshal", &self.xml_marshal.is_some())
            .field("xml_unmarshal", &self.xml_unmarshal.is_some())
            .finish()
    }
}
