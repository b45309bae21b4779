use clap::ValueEnum;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq)]
pub enum Database {
    Tarantool,
}
