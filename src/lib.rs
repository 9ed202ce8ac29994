// symgraph: cross-language code graph

pub mod config;
pub mod index;
pub mod indexer;
pub mod languages;
pub mod plugins;
pub mod query;
pub mod resolver;
