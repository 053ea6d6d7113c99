//! Mainland financial news sites.

pub mod eastmoney;
pub mod nbd;
pub mod sina;
pub mod stcn;
