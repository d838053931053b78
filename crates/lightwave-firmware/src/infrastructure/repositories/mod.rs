mod key_value;

pub(crate) use key_value::FlashKeyValueStore;
