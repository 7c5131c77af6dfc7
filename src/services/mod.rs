pub mod normalizer;
pub mod openweather;
pub mod refresh;
