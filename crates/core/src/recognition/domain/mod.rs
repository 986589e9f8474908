pub mod encoding_cache;
pub mod gallery;
pub mod identity;
pub mod identity_matcher;
pub mod identity_voter;
pub mod vp_tree_index;
