pub mod api;
pub mod bin_fixture_file;
pub mod bin_source;
pub mod db;
