pub mod trip_ready;
