pub mod error;
pub mod models;
pub mod schema;
pub mod writer;


#[cfg(test)]
pub(crate) mod test_helpers;
