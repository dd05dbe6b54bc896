pub mod apd;
pub mod data_product;
pub mod detector;
pub mod filter;
pub mod spectrum;
pub mod td_power;

pub use apd::{AmplitudeDistribution, ApdEstimator};
pub use data_product::{DataProduct, DataProductAssembler, ProductComponent, ProductParams};
pub use detector::{PowerDetector, Statistic};
pub use filter::{FilterSpec, SosFilter};
pub use spectrum::{PowerSpectrum, SpectralEstimator, SpectrumScaling};
pub use td_power::{QuantileFilter, TimeDomainPower, TimeDomainPowerEngine};
