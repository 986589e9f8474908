pub mod json_encoding_cache;
