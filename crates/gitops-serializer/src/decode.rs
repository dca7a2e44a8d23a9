//! Decode: frame bytes into typed/unknown objects, with strict validation,
//! defaulting, hub conversion, and list expansion (§4.3).

use std::collections::VecDeque;

use gitops_core::{Error, GroupVersionKind, Object, Result, Unknown};
use gitops_frame::FrameReader;
use gitops_registry::Registry;

use crate::defaulting;

/// Decode options (§4.3).
#[derive(Clone, Copy, Debug)]
pub struct DecodeOptions {
    /// Reject duplicate top-level keys and top-level fields the frame's
    /// registered type does not recognize (§4.3).
    pub strict: bool,
    /// Run defaulting after decode.
    pub default: bool,
    /// Convert the decoded object onto its group's hub version afterward.
    /// Ignored by `decode_into`.
    pub convert_to_hub: bool,
    /// Expand a meta-list frame into one decoded item per element.
    pub decode_list_elements: bool,
    /// Wrap frames with an unrecognized GVK as `Decoded::Unknown` instead
    /// of failing.
    pub decode_unknown: bool,
    /// Stash the original frame bytes into the comment-source annotation.
    pub preserve_comments: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            strict: true,
            default: false,
            convert_to_hub: false,
            decode_list_elements: true,
            decode_unknown: false,
            preserve_comments: false,
        }
    }
}

/// One decoded frame: a registered concrete type, or raw bytes under an
/// unrecognized GVK (§3 "Unknown" variant).
#[derive(Debug)]
pub enum Decoded {
    Typed(Box<dyn Object>),
    Unknown(Unknown),
}

impl Decoded {
    pub fn gvk(&self) -> GroupVersionKind {
        match self {
            Decoded::Typed(obj) => obj.gvk(),
            Decoded::Unknown(u) => u.gvk.clone(),
        }
    }
}

/// Decodes successive frames from a `FrameReader` against a `Registry`
/// (§4.3). Expanded meta-list items are queued and returned before pulling
/// the next frame from the underlying reader.
pub struct Decoder<'a> {
    registry: &'a Registry,
    reader: Box<dyn FrameReader>,
    options: DecodeOptions,
    pending: VecDeque<Vec<u8>>,
}

impl<'a> Decoder<'a> {
    pub fn new(registry: &'a Registry, reader: Box<dyn FrameReader>, options: DecodeOptions) -> Self {
        Self {
            registry,
            reader,
            options,
            pending: VecDeque::new(),
        }
    }

    /// Decode the next frame, expanding a pending meta-list first.
    pub fn decode(&mut self) -> Result<Option<Decoded>> {
        let frame = match self.next_raw_frame()? {
            Some(frame) => frame,
            None => return Ok(None),
        };
        Ok(Some(self.decode_frame(frame)?))
    }

    /// Decode every remaining frame.
    pub fn decode_all(&mut self) -> Result<Vec<Decoded>> {
        let mut out = Vec::new();
        while let Some(decoded) = self.decode()? {
            out.push(decoded);
        }
        Ok(out)
    }

    /// Decode the next frame directly into `target`'s concrete type,
    /// ignoring `convert_to_hub` (§4.3: "`decodeInto` ignores this
    /// option").
    pub fn decode_into(&mut self, target: &mut dyn Object) -> Result<()> {
        let frame = self
            .next_raw_frame()?
            .ok_or_else(|| Error::other("no frame available to decode into target"))?;
        let value = self.parse_frame(&frame)?;
        let gvk = type_meta_gvk(&value)?;
        if self.options.strict {
            self.registry.decode_into_strict(&gvk, value, target)?;
        } else {
            self.registry.decode_into(&gvk, value, target)?;
        }
        if self.options.default {
            defaulting::default_in_place(self.registry, target)?;
        }
        if self.options.preserve_comments && self.reader.content_type() == gitops_core::ContentType::Yaml {
            stash_comments(target, &frame);
        }
        Ok(())
    }

    fn next_raw_frame(&mut self) -> Result<Option<Vec<u8>>> {
        if let Some(frame) = self.pending.pop_front() {
            return Ok(Some(frame));
        }
        match self.reader.read_frame()? {
            Some(frame) => Ok(Some(frame)),
            None => Ok(None),
        }
    }

    fn parse_frame(&self, frame: &[u8]) -> Result<serde_json::Value> {
        match self.reader.content_type() {
            gitops_core::ContentType::Yaml => {
                let text = std::str::from_utf8(frame).map_err(|e| Error::other(e.to_string()))?;
                let value: serde_yaml::Value = serde_yaml::from_str(text)?;
                if self.options.strict {
                    reject_duplicate_keys(&value)?;
                }
                Ok(serde_json::to_value(value)?)
            }
            gitops_core::ContentType::Json => Ok(serde_json::from_slice(frame)?),
        }
    }

    fn decode_frame(&mut self, frame: Vec<u8>) -> Result<Decoded> {
        let value = self.parse_frame(&frame)?;

        if self.options.decode_list_elements {
            if let Some(items) = value.get("items").and_then(|v| v.as_array()).cloned() {
                for item in items {
                    self.pending.push_back(serde_json::to_vec(&item)?);
                }
                return match self.next_raw_frame()? {
                    Some(next) => self.decode_frame(next),
                    None => Err(Error::other("meta-list frame had no items")),
                };
            }
        }

        let gvk = type_meta_gvk(&value)?;

        if !self.registry.is_registered(&gvk) {
            let cause = self.registry.classify_unrecognized(&gvk);
            if self.options.decode_unknown {
                return Ok(Decoded::Unknown(Unknown {
                    gvk,
                    content_type: self.reader.content_type(),
                    raw: frame,
                }));
            }
            return Err(Error::UnrecognizedType {
                gvk,
                cause,
                raw_bytes: frame,
            });
        }

        let mut obj = if self.options.strict {
            self.registry.decode_strict(&gvk, value)?
        } else {
            self.registry.decode(&gvk, value)?
        };

        if self.options.default {
            defaulting::default_in_place(self.registry, obj.as_mut())?;
        }
        if self.options.convert_to_hub {
            obj = defaulting::convert_to_hub(self.registry, obj)?;
        }
        if self.options.preserve_comments && self.reader.content_type() == gitops_core::ContentType::Yaml {
            stash_comments(obj.as_mut(), &frame);
        }

        Ok(Decoded::Typed(obj))
    }
}

fn stash_comments(obj: &mut dyn Object, frame: &[u8]) {
    gitops_core::set_comment_source(obj.metadata_mut(), frame);
}

fn type_meta_gvk(value: &serde_json::Value) -> Result<GroupVersionKind> {
    let api_version = value.get("apiVersion").and_then(|v| v.as_str()).unwrap_or("");
    let kind = value.get("kind").and_then(|v| v.as_str()).unwrap_or("");
    Ok(GroupVersionKind::from_api_version_kind(api_version, kind))
}

/// Walk a parsed `serde_yaml::Value` tree looking for a mapping with
/// duplicate keys. `serde_yaml`'s mapping type de-duplicates on insert
/// without erroring, so a dedicated scan is needed for strict mode (§4.3).
fn reject_duplicate_keys(value: &serde_yaml::Value) -> Result<()> {
    match value {
        serde_yaml::Value::Mapping(map) => {
            let mut seen = std::collections::HashSet::new();
            for key in map.keys() {
                let rendered = serde_yaml::to_string(key).unwrap_or_default();
                if !seen.insert(rendered) {
                    return Err(Error::StrictDecode("duplicate key in mapping".to_string()));
                }
            }
            for value in map.values() {
                reject_duplicate_keys(value)?;
            }
            Ok(())
        }
        serde_yaml::Value::Sequence(seq) => {
            for item in seq {
                reject_duplicate_keys(item)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
