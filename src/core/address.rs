/*
 * Copyright Stalwart Labs Ltd. See the COPYING
 * file at the top-level directory of this distribution.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use std::fmt::{self, Display};

/// An RFC 2822 mailbox: optional display name plus an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Addr {
    /// Display name, including any comments found next to the address.
    pub name: Option<String>,
    pub address: String,
}

impl Addr {
    pub fn new(name: Option<&str>, address: &str) -> Addr {
        Addr {
            name: name.map(|name| name.to_string()),
            address: address.to_string(),
        }
    }
}

impl Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) if !name.is_empty() => {
                if name
                    .chars()
                    .all(|ch| ch.is_alphanumeric() || matches!(ch, ' ' | '-' | '_' | '.'))
                {
                    write!(f, "{} <{}>", name, self.address)
                } else {
                    write!(f, "\"{}\" <{}>", name.replace('"', "\\\""), self.address)
                }
            }
            _ => f.write_str(&self.address),
        }
    }
}

/// A named group of mailboxes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub name: String,
    pub addresses: Vec<Addr>,
}

#[derive(Debug, PartialEq)]
enum Token {
    Atom(String),
    Quoted(String),
    Comment(String),
    Angle(String),
    Comma,
    Colon,
    Semicolon,
}

fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            ':' => {
                chars.next();
                tokens.push(Token::Colon);
            }
            ';' => {
                chars.next();
                tokens.push(Token::Semicolon);
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                let mut escaped = false;
                for ch in chars.by_ref() {
                    if escaped {
                        text.push(ch);
                        escaped = false;
                    } else if ch == '\\' {
                        escaped = true;
                    } else if ch == '"' {
                        break;
                    } else {
                        text.push(ch);
                    }
                }
                tokens.push(Token::Quoted(text));
            }
            '(' => {
                chars.next();
                let mut text = String::new();
                let mut depth = 1u32;
                let mut escaped = false;
                for ch in chars.by_ref() {
                    if escaped {
                        text.push(ch);
                        escaped = false;
                        continue;
                    }
                    match ch {
                        '\\' => escaped = true,
                        '(' => {
                            depth += 1;
                            text.push(ch);
                        }
                        ')' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                            text.push(ch);
                        }
                        _ => text.push(ch),
                    }
                }
                tokens.push(Token::Comment(text));
            }
            '<' => {
                chars.next();
                let mut text = String::new();
                for ch in chars.by_ref() {
                    if ch == '>' {
                        break;
                    }
                    text.push(ch);
                }
                tokens.push(Token::Angle(text.trim().to_string()));
            }
            _ if ch.is_whitespace() => {
                chars.next();
            }
            _ => {
                let mut text = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_whitespace() || matches!(ch, ',' | ':' | ';' | '"' | '(' | '<') {
                        break;
                    }
                    text.push(ch);
                    chars.next();
                }
                tokens.push(Token::Atom(text));
            }
        }
    }

    tokens
}

fn mailbox_from(tokens: &[Token]) -> Option<Addr> {
    let mut words: Vec<String> = Vec::new();
    let mut comments: Vec<String> = Vec::new();
    let mut angle: Option<String> = None;

    for token in tokens {
        match token {
            Token::Atom(text) => words.push(text.clone()),
            Token::Quoted(text) => words.push(text.clone()),
            Token::Comment(text) => comments.push(text.clone()),
            Token::Angle(text) => angle = Some(text.clone()),
            _ => {}
        }
    }

    let (address, mut name) = match angle {
        Some(address) => (address, words.join(" ")),
        None => {
            if words.is_empty() {
                return None;
            }
            // addr-spec may have been split around special characters
            (words.join(""), String::new())
        }
    };

    if !comments.is_empty() {
        if !name.is_empty() {
            name.push(' ');
        }
        name.push('(');
        name.push_str(&comments.join(", "));
        name.push(')');
    }

    if address.is_empty() && name.is_empty() {
        None
    } else {
        Some(Addr {
            name: if name.is_empty() { None } else { Some(name) },
            address,
        })
    }
}

/// Parses an address list, flattening any groups into their mailboxes.
pub fn parse_address_list(input: &str) -> Vec<Addr> {
    parse_address_field(input).0
}

/// Parses an address list keeping group structure.
pub fn parse_address_field(input: &str) -> (Vec<Addr>, Vec<Group>) {
    let tokens = tokenize(input);
    let mut addresses = Vec::new();
    let mut groups = Vec::new();

    let mut pending = Vec::new();
    let mut group: Option<Group> = None;

    for token in tokens {
        match token {
            Token::Comma | Token::Semicolon => {
                if let Some(addr) = mailbox_from(&pending) {
                    if let Some(group) = group.as_mut() {
                        group.addresses.push(addr.clone());
                    }
                    addresses.push(addr);
                }
                pending.clear();
                if matches!(token, Token::Semicolon) {
                    if let Some(group) = group.take() {
                        groups.push(group);
                    }
                }
            }
            Token::Colon => {
                // everything collected so far was the group display name
                let name = pending
                    .iter()
                    .filter_map(|token| match token {
                        Token::Atom(text) | Token::Quoted(text) => Some(text.as_str()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                group = Some(Group {
                    name,
                    addresses: Vec::new(),
                });
                pending.clear();
            }
            token => pending.push(token),
        }
    }

    if let Some(addr) = mailbox_from(&pending) {
        if let Some(group) = group.as_mut() {
            group.addresses.push(addr.clone());
        }
        addresses.push(addr);
    }
    if let Some(group) = group.take() {
        groups.push(group);
    }

    (addresses, groups)
}
