pub mod investigation;
