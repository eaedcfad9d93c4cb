//! Deforestation monitoring pipeline for Minas Gerais: municipal boundaries,
//! monthly hotspot polygons and socioeconomic indicators in; statistics,
//! a correlation matrix and report charts out.

pub mod boundary;
pub mod charts;
pub mod config;
pub mod correlation;
pub mod crs;
pub mod error;
pub mod geometry;
pub mod gpkg;
pub mod hotspots;
pub mod indicators;
pub mod io;
pub mod pipeline;
pub mod stats;
pub mod unified;

pub use config::PipelineConfig;
pub use error::{CanopyError, Result};
pub use pipeline::{Analysis, Pipeline, PipelineReport};
