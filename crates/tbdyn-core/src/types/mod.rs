pub mod mixing;
pub mod stratification;
