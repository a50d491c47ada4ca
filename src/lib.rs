
pub mod core {
    pub mod adb;
    pub mod collector;
    pub mod command;
    pub mod config;
    pub mod device;
    pub mod error;
    pub mod launcher;
    pub mod ledger;
    pub mod record;
    pub mod runner;
    pub mod summary;
}


pub mod reporters;
