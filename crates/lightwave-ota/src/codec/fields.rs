//! Key-set and single-field extraction over `serde-json-core`.

use core::fmt;
use core::marker::PhantomData;

use heapless::{String, Vec};
use serde::de::{self, Deserialize, Deserializer, IgnoredAny, MapAccess, Visitor};

use super::DecodeError;

const MAX_KEY_LEN: usize = 16;
const MAX_KEYS: usize = 12;

/// Object key. Keys longer than any known field are kept as `overlong` so
/// they still count as unknown instead of failing the parse.
struct Key {
    name: String<MAX_KEY_LEN>,
    overlong: bool,
}

impl Key {
    fn is(&self, name: &str) -> bool {
        !self.overlong && self.name.as_str() == name
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyVisitor;

        impl<'de> Visitor<'de> for KeyVisitor {
            type Value = Key;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object key")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Key, E> {
                let mut name = String::new();
                let overlong = name.push_str(value).is_err();
                Ok(Key { name, overlong })
            }
        }

        deserializer.deserialize_str(KeyVisitor)
    }
}

/// Keys present at the top level of a message.
pub(super) struct KeySet {
    keys: Vec<Key, MAX_KEYS>,
    overflow: bool,
}

impl KeySet {
    pub(super) fn parse(text: &str) -> Result<Self, DecodeError> {
        serde_json_core::from_str::<KeySet>(text)
            .map(|(keys, _)| keys)
            .map_err(|_| DecodeError::InvalidJson)
    }

    /// Every present key appears in `allowed`.
    pub(super) fn only(&self, allowed: &[&str]) -> bool {
        !self.overflow
            && self
                .keys
                .iter()
                .all(|key| allowed.iter().any(|name| key.is(name)))
    }
}

impl<'de> Deserialize<'de> for KeySet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeySetVisitor;

        impl<'de> Visitor<'de> for KeySetVisitor {
            type Value = KeySet;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<KeySet, A::Error> {
                let mut set = KeySet {
                    keys: Vec::new(),
                    overflow: false,
                };
                while let Some(key) = map.next_key::<Key>()? {
                    map.next_value::<IgnoredAny>()?;
                    if set.keys.push(key).is_err() {
                        set.overflow = true;
                    }
                }
                Ok(set)
            }
        }

        deserializer.deserialize_map(KeySetVisitor)
    }
}

pub(super) trait FieldName {
    const NAME: &'static str;
}

/// One field of an object; every other key is skipped.
struct Pick<T, F> {
    value: Option<T>,
    field: PhantomData<F>,
}

impl<'de, T: Deserialize<'de>, F: FieldName> Deserialize<'de> for Pick<T, F> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(PickVisitor::<T, F>(PhantomData))
    }
}

struct PickVisitor<T, F>(PhantomData<(T, F)>);

impl<'de, T: Deserialize<'de>, F: FieldName> Visitor<'de> for PickVisitor<T, F> {
    type Value = Pick<T, F>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "an object with field `{}`", F::NAME)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut value = None;
        while let Some(key) = map.next_key::<Key>()? {
            if value.is_none() && key.is(F::NAME) {
                value = Some(map.next_value::<T>()?);
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(Pick {
            value,
            field: PhantomData,
        })
    }
}

/// Extract field `F` as `T`. `Ok(None)` means the key is absent; a value of
/// the wrong type is reported against the field name.
pub(super) fn pick<'a, T: Deserialize<'a>, F: FieldName>(
    text: &'a str,
) -> Result<Option<T>, DecodeError> {
    serde_json_core::from_str::<Pick<T, F>>(text)
        .map(|(pick, _)| pick.value)
        .map_err(|_| DecodeError::Field(F::NAME))
}

/// Optional string field copied into a bounded buffer, with JSON escapes
/// resolved. `null` counts as absent.
pub(super) fn optional_string<F: FieldName, const N: usize>(
    text: &str,
) -> Result<Option<String<N>>, DecodeError> {
    let Some(raw) = pick::<Option<&str>, F>(text)?.flatten() else {
        return Ok(None);
    };
    unescape(text, raw)
        .map(Some)
        .ok_or(DecodeError::Field(F::NAME))
}

/// Owned copy of the string value `raw`, which must be borrowed from `text`.
///
/// Borrowed values come out of `serde-json-core` with their escapes still
/// in place, so an escaped value is parsed again as a JSON string literal.
pub(crate) fn unescape<const N: usize>(text: &str, raw: &str) -> Option<String<N>> {
    if !raw.contains('\\') {
        let mut owned = String::new();
        owned.push_str(raw).ok()?;
        return Some(owned);
    }

    let start = (raw.as_ptr() as usize).checked_sub(text.as_ptr() as usize)?;
    let literal = text.get(start.checked_sub(1)?..start + raw.len() + 1)?;
    let mut scratch = [0u8; N];
    serde_json_core::from_str_escaped::<String<N>>(literal, &mut scratch)
        .ok()
        .map(|(value, _)| value)
}

macro_rules! field_names {
    ($($marker:ident => $name:literal),* $(,)?) => {
        $(
            pub(crate) struct $marker;

            impl FieldName for $marker {
                const NAME: &'static str = $name;
            }
        )*
    };
}

pub(super) mod key {
    use super::FieldName;

    field_names! {
        Type => "type",
        RequestId => "requestId",
        Size => "size",
        Md5 => "md5",
        Token => "token",
        Version => "version",
        Force => "force",
        Target => "target",
        Offset => "offset",
        Data => "data",
    }
}
