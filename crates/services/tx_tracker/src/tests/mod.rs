#![allow(non_snake_case)]


mod tests_event_stream;
