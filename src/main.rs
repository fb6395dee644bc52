use crate::error::CiResult;

mod cli;
mod cluster;
mod cmd;
mod config;
mod containerize;
mod error;
mod io;
mod options;
mod report;

#[macro_use]
extern crate lazy_static;
extern crate regex;

fn main() -> CiResult<()> {
    cli::run()
}
