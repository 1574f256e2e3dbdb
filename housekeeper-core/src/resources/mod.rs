pub mod crd;
pub mod labels;
pub mod release;
