pub mod collada;
pub mod skm;
