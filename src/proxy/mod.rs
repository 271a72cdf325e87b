pub mod token;
pub mod upstream;
