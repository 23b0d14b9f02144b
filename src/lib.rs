// src/lib.rs

pub mod canonical;
pub mod config;
pub mod derived;
pub mod fitting;
pub mod gda;
pub mod grid;
pub mod particle;
pub mod pic_info;
pub mod power_spectrum;
pub mod region;
pub mod scalar_field;
pub mod spectrum;
pub mod vec3;
pub mod visualisation;
