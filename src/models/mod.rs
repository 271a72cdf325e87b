pub mod invoice;
pub mod taxpayer;
