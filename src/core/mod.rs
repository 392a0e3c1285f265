pub mod affinity;
pub mod connectivity;
pub mod embedding;
pub mod gradient;
pub mod masking;
pub mod parcellation;
pub mod signal;
pub mod stats;
