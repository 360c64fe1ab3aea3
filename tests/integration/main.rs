//! Integration tests: the full router over a mock source and a real store.

mod api_flow;
mod mock_source;
