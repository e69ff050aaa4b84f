use nom::{
    branch::alt,
    bytes::complete::tag_no_case,
    character::complete::{char, digit1, multispace0, satisfy},
    combinator::{all_consuming, map, map_res, opt, recognize, value},
    sequence::{delimited, pair},
    IResult,
};

use crate::model::Gender;

/// Longest history entry accepted at the prompt.
pub const MAX_HISTORY_ENTRY_LEN: usize = 499;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Command {
    Add,
    UpdateHistory,
    Discharge,
    Find,
    ListActive,
    ListAll,
    Remove,
    PurgeDischarged,
    Save,
    ExportText,
    ExportJson,
    Help,
    Exit,
}

impl Command {
    pub const MENU: [(u8, Command, &'static str); 12] = [
        (1, Command::Add, "Add patient"),
        (2, Command::UpdateHistory, "Update medical history"),
        (3, Command::Discharge, "Discharge patient"),
        (4, Command::Find, "Find patient"),
        (5, Command::ListActive, "List active patients"),
        (6, Command::ListAll, "List all patients"),
        (7, Command::Remove, "Remove patient"),
        (8, Command::PurgeDischarged, "Purge discharged patients"),
        (9, Command::Save, "Save records"),
        (10, Command::ExportText, "Export text report"),
        (11, Command::ExportJson, "Export JSON"),
        (0, Command::Exit, "Exit"),
    ];

    fn from_number(n: u8) -> Option<Command> {
        Self::MENU.iter().find(|(k, _, _)| *k == n).map(|(_, c, _)| *c)
    }
}

// --- BASIC PARSERS ---

fn parse_i32(input: &str) -> IResult<&str, i32> {
    map_res(recognize(pair(opt(alt((char('-'), char('+')))), digit1)), |s: &str| s.parse::<i32>())(input)
}

fn ws<'a, F, O, E: nom::error::ParseError<&'a str>>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O, E>
where F: FnMut(&'a str) -> IResult<&'a str, O, E> {
    delimited(multispace0, inner, multispace0)
}

fn tag_ci(t: &'static str) -> impl FnMut(&str) -> IResult<&str, &str> {
    move |input| tag_no_case(t)(input)
}

// --- COMMAND PARSERS ---

fn parse_menu_number(input: &str) -> IResult<&str, Command> {
    let (rest, n) = map_res(digit1, |s: &str| s.parse::<u8>())(input)?;
    match Command::from_number(n) {
        Some(cmd) => Ok((rest, cmd)),
        None => Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit))),
    }
}

fn parse_keyword(input: &str) -> IResult<&str, Command> {
    alt((
        value(Command::Add, alt((tag_ci("ADD"), tag_ci("ADMIT")))),
        value(Command::UpdateHistory, alt((tag_ci("UPDATE"), tag_ci("HISTORY")))),
        value(Command::Discharge, tag_ci("DISCHARGE")),
        value(Command::Find, alt((tag_ci("FIND"), tag_ci("GET")))),
        value(Command::ListAll, tag_ci("LIST ALL")),
        value(Command::ListActive, tag_ci("LIST")),
        value(Command::Remove, alt((tag_ci("REMOVE"), tag_ci("DELETE")))),
        value(Command::PurgeDischarged, tag_ci("PURGE")),
        value(Command::Save, tag_ci("SAVE")),
        value(Command::ExportJson, tag_ci("JSON")),
        value(Command::ExportText, alt((tag_ci("EXPORT"), tag_ci("REPORT")))),
        value(Command::Help, alt((tag_ci("HELP"), tag_ci("?")))),
        value(Command::Exit, alt((tag_ci("EXIT"), tag_ci("QUIT")))),
    ))(input)
}

/// Parses a menu selection: either its number or a keyword.
pub fn parse_command(input: &str) -> Result<Command, String> {
    let input = input.trim();
    match all_consuming(ws(alt((parse_menu_number, parse_keyword))))(input) {
        Ok((_, cmd)) => Ok(cmd),
        Err(_) => Err(format!("Unknown choice: '{}'", shorten(input))),
    }
}

pub fn parse_int(input: &str) -> Result<i32, String> {
    let input = input.trim();
    match all_consuming(parse_i32)(input) {
        Ok((_, n)) => Ok(n),
        Err(_) => Err(format!("Expected a whole number, got '{}'", shorten(input))),
    }
}

pub fn parse_gender(input: &str) -> Result<Gender, String> {
    let input = input.trim();
    let letter = satisfy(|c: char| c.is_ascii_alphabetic());
    let word = alt((
        value('M', tag_ci("MALE")),
        value('F', tag_ci("FEMALE")),
        value('O', tag_ci("OTHER")),
        letter,
    ));
    match all_consuming(word)(input) {
        Ok((_, c)) => Gender::try_from(c).map_err(|e| e.to_string()),
        Err(_) => Err(format!("Expected M, F or O, got '{}'", shorten(input))),
    }
}

/// Free text bounded to `max` characters.
pub fn parse_text(input: &str, max: usize) -> Result<String, String> {
    let text = input.trim();
    let len = text.chars().count();
    if len > max {
        return Err(format!("Text too long ({} characters, max {})", len, max));
    }
    Ok(text.to_string())
}

pub fn parse_yes_no(input: &str, default: bool) -> Result<bool, String> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(default);
    }
    let answer = alt((
        map(alt((tag_ci("YES"), tag_ci("Y"))), |_| true),
        map(alt((tag_ci("NO"), tag_ci("N"))), |_| false),
    ));
    match all_consuming(answer)(input) {
        Ok((_, b)) => Ok(b),
        Err(_) => Err(format!("Expected y or n, got '{}'", shorten(input))),
    }
}

fn shorten(input: &str) -> String {
    if input.chars().count() > 20 {
        format!("{}...", input.chars().take(20).collect::<String>())
    } else {
        input.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_numbers_and_keywords() {
        assert_eq!(parse_command("1"), Ok(Command::Add));
        assert_eq!(parse_command(" 10 \n"), Ok(Command::ExportText));
        assert_eq!(parse_command("0"), Ok(Command::Exit));
        assert_eq!(parse_command("list all"), Ok(Command::ListAll));
        assert_eq!(parse_command("LIST"), Ok(Command::ListActive));
        assert_eq!(parse_command("quit"), Ok(Command::Exit));
        assert!(parse_command("12").is_err());
        assert!(parse_command("1 2").is_err());
        assert!(parse_command("").is_err());
    }

    #[test]
    fn integers() {
        assert_eq!(parse_int("42"), Ok(42));
        assert_eq!(parse_int(" -3 "), Ok(-3));
        assert_eq!(parse_int("+7"), Ok(7));
        assert!(parse_int("4x").is_err());
        assert!(parse_int("99999999999").is_err());
        assert!(parse_int("").is_err());
    }

    #[test]
    fn genders() {
        assert_eq!(parse_gender("f"), Ok(Gender::Female));
        assert_eq!(parse_gender("Male"), Ok(Gender::Male));
        assert_eq!(parse_gender(" O\n"), Ok(Gender::Other));
        assert!(parse_gender("x").is_err());
        assert!(parse_gender("MF").is_err());
        assert!(parse_gender("").is_err());
    }

    #[test]
    fn bounded_text() {
        assert_eq!(parse_text("  flu \n", 10), Ok("flu".to_string()));
        assert!(parse_text(&"a".repeat(11), 10).is_err());
        assert_eq!(parse_text("", 10), Ok(String::new()));
    }

    #[test]
    fn yes_no() {
        assert_eq!(parse_yes_no("y", false), Ok(true));
        assert_eq!(parse_yes_no("No", true), Ok(false));
        assert_eq!(parse_yes_no("", true), Ok(true));
        assert!(parse_yes_no("maybe", true).is_err());
    }
}
