// Web search integration (SerpAPI)

pub mod serpapi;

pub use serpapi::*;
