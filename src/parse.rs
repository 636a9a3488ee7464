use crate::command::{Command, DeleteCommand, GetCommand, PutCommand};

pub fn parse_command(input: &str) -> Result<Command, String> {
    let tokens = Lexer::new(input).lex()?;
    parse_tokens(tokens.into_iter())
}

#[derive(Debug)]
enum Keyword {
    Get,
    Put,
    Delete,
    Scan,
    Stats,
    Verify,
    Exit,
}

impl Keyword {
    fn from_word(word: &str) -> Option<Keyword> {
        match word.to_ascii_uppercase().as_str() {
            "GET" => Some(Keyword::Get),
            "PUT" => Some(Keyword::Put),
            "DELETE" => Some(Keyword::Delete),
            "SCAN" => Some(Keyword::Scan),
            "STATS" => Some(Keyword::Stats),
            "VERIFY" => Some(Keyword::Verify),
            "EXIT" => Some(Keyword::Exit),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq)]
enum Token {
    /// Bare word, a keyword, field name or unquoted value
    Word(String),
    Literal(String),
    Equals,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '.' | '_' | '+')
}

#[derive(Debug)]
struct Lexer {
    input: Vec<char>,
    pos: usize,
    buffer: String,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(input: &str) -> Lexer {
        Lexer {
            input: input.chars().collect(),
            pos: 0,
            buffer: String::new(),
            tokens: Vec::new(),
        }
    }

    fn lex(mut self) -> Result<Vec<Token>, String> {
        while let Some(c) = self.input.get(self.pos) {
            if c.is_whitespace() {
                self.pos += 1;
            } else if *c == '=' {
                self.pos += 1;
                self.tokens.push(Token::Equals);
            } else if is_word_char(*c) {
                self.lex_word();
            } else if *c == '"' {
                self.lex_literal()?;
            } else {
                return Err(format!("Unexpected character: {}", c));
            }
        }
        Ok(self.tokens)
    }

    fn lex_word(&mut self) {
        while let Some(c) = self.input.get(self.pos) {
            if !is_word_char(*c) {
                break;
            }
            self.buffer.push(*c);
            self.pos += 1;
        }
        self.tokens.push(Token::Word(std::mem::take(&mut self.buffer)));
    }

    fn lex_literal(&mut self) -> Result<(), String> {
        // Skip the first '"'
        self.pos += 1;

        // Flag to indicate if the next character is escaped
        let mut is_escaped = false;

        while let Some(c) = self.input.get(self.pos) {
            self.pos += 1;
            if is_escaped {
                match c {
                    '"' | '\\' => self.buffer.push(*c),
                    'n' => self.buffer.push('\n'),
                    't' => self.buffer.push('\t'),
                    _ => {
                        return Err(format!("Invalid escaped character: {}", c));
                    }
                }
                is_escaped = false;
            } else {
                match c {
                    '"' => {
                        self.tokens
                            .push(Token::Literal(std::mem::take(&mut self.buffer)));
                        return Ok(());
                    }
                    '\\' => {
                        is_escaped = true;
                    }
                    _ => {
                        self.buffer.push(*c);
                    }
                }
            }
        }

        Err(format!("Unexpected end of input, {}", self.buffer))
    }
}

fn parse_tokens(mut tokens: impl Iterator<Item = Token>) -> Result<Command, String> {
    let keyword = match tokens.next() {
        None => return Err("Unexpected end of input".into()),
        Some(Token::Word(word)) => Keyword::from_word(&word)
            .ok_or_else(|| format!("Unknown command: {}", word))?,
        Some(_) => return Err("Expected a command keyword".into()),
    };
    match keyword {
        Keyword::Get => {
            let value = parse_value(&mut tokens, "GET")?;
            expect_end(&mut tokens)?;
            Ok(Command::Get(GetCommand(value)))
        }
        Keyword::Delete => {
            let value = parse_value(&mut tokens, "DELETE")?;
            expect_end(&mut tokens)?;
            Ok(Command::Delete(DeleteCommand(value)))
        }
        Keyword::Put => process_put_keyword(&mut tokens),
        Keyword::Scan => expect_end(&mut tokens).map(|_| Command::Scan),
        Keyword::Stats => expect_end(&mut tokens).map(|_| Command::Stats),
        Keyword::Verify => expect_end(&mut tokens).map(|_| Command::Verify),
        Keyword::Exit => expect_end(&mut tokens).map(|_| Command::Exit),
    }
}

fn expect_end(tokens: &mut impl Iterator<Item = Token>) -> Result<(), String> {
    match tokens.next() {
        None => Ok(()),
        Some(token) => Err(format!("Unexpected token: {:?}", token)),
    }
}

fn parse_value(tokens: &mut impl Iterator<Item = Token>, after: &str) -> Result<String, String> {
    match tokens.next() {
        Some(Token::Word(value)) | Some(Token::Literal(value)) => Ok(value),
        _ => Err(format!("Expected value after {}", after)),
    }
}

fn process_put_keyword(tokens: &mut impl Iterator<Item = Token>) -> Result<Command, String> {
    let mut assignments = vec![];
    while let Some(token) = tokens.next() {
        let Token::Word(field) = token else {
            return Err("Expected field name".to_string());
        };
        if tokens.next() != Some(Token::Equals) {
            return Err(format!("Expected = after {}", field));
        }
        let value = parse_value(tokens, &field)?;
        assignments.push((field, value));
    }
    if assignments.is_empty() {
        return Err("Expected field=value after PUT".to_string());
    }
    Ok(Command::Put(PutCommand(assignments)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_put_with_quoted_values() {
        let cmd = parse_command(r#"put id=3 name="alice \"a\" smith""#).unwrap();
        assert_eq!(
            cmd,
            Command::Put(PutCommand(vec![
                ("id".to_string(), "3".to_string()),
                ("name".to_string(), "alice \"a\" smith".to_string()),
            ]))
        );
    }

    #[test]
    fn keywords_only_count_in_first_position() {
        assert_eq!(
            parse_command("GET exit").unwrap(),
            Command::Get(GetCommand("exit".to_string()))
        );
        assert_eq!(
            parse_command("DELETE -4").unwrap(),
            Command::Delete(DeleteCommand("-4".to_string()))
        );
        assert_eq!(parse_command("scan").unwrap(), Command::Scan);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse_command("").is_err());
        assert!(parse_command("GET").is_err());
        assert!(parse_command("GET 1 2").is_err());
        assert!(parse_command("PUT id 1").is_err());
        assert!(parse_command("PUT").is_err());
        assert!(parse_command("FETCH 1").is_err());
        assert!(parse_command(r#"GET "open"#).is_err());
        assert!(parse_command("GET a;b").is_err());
    }
}
