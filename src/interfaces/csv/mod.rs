pub mod action_reader;
pub mod booking_writer;
