use std::str::FromStr;

use crate::parse::parse_command;

/// `PUT field=value ...`, values still as typed, coerced against the schema
/// when executed
#[derive(Debug, Clone, PartialEq)]
pub struct PutCommand(pub Vec<(String, String)>);

/// `GET value`, looks up by the index's key field
#[derive(Debug, Clone, PartialEq)]
pub struct GetCommand(pub String);

/// `DELETE value`
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteCommand(pub String);

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Put(PutCommand),
    Get(GetCommand),
    Delete(DeleteCommand),
    Scan,
    Stats,
    Verify,
    Exit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_command(s)
    }
}
