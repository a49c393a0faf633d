mod sampler;

pub use sampler::{FixFuture, GeoFix, GeoSampler, LocationProvider, NoLocationProvider};
