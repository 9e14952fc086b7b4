//! Reader for the WKT1 (OGC 01-009) notation of coordinate reference systems.
//!
//! Only the syntax is handled here: the text is read into a tree of [`WktNode`]s, which
//! [`Crs::from_wkt`](super::Crs::from_wkt) then interprets.

/// A keyword with its bracketed values, e.g. `SPHEROID["Airy 1830",6377563.396,299.3249646]`.
#[derive(Debug, Clone, PartialEq)]
pub struct WktNode {
    /// Keyword as written in the text.
    pub keyword: String,
    /// Values in the order they appear.
    pub values: Vec<WktValue>,
}

/// A value inside the brackets of a [`WktNode`].
#[derive(Debug, Clone, PartialEq)]
pub enum WktValue {
    /// Quoted text.
    Text(String),
    /// Number.
    Number(f64),
    /// Bare word, e.g. `EAST` in `AXIS["X",EAST]`.
    Word(String),
    /// Nested node.
    Node(WktNode),
}

impl WktNode {
    /// Parses the WKT text. The whole input must be a single node.
    pub fn parse(input: &str) -> Result<Self, String> {
        let mut reader = Reader {
            input: input.as_bytes(),
            position: 0,
        };

        let node = match reader.value()? {
            WktValue::Node(node) => node,
            _ => return Err("expected a keyword with bracketed values".into()),
        };

        reader.skip_whitespace();
        if reader.position < reader.input.len() {
            return Err(format!(
                "unexpected characters after the root node at {}",
                reader.position
            ));
        }

        Ok(node)
    }

    /// Returns true if the node's keyword is `keyword`, ignoring case.
    pub fn is(&self, keyword: &str) -> bool {
        self.keyword.eq_ignore_ascii_case(keyword)
    }

    /// The first direct child with the given keyword.
    pub fn child<'a>(&'a self, keyword: &'a str) -> Option<&'a WktNode> {
        self.children(keyword).next()
    }

    /// All direct children with the given keyword.
    pub fn children<'a>(&'a self, keyword: &'a str) -> impl Iterator<Item = &'a WktNode> + 'a {
        self.values.iter().filter_map(move |value| match value {
            WktValue::Node(node) if node.is(keyword) => Some(node),
            _ => None,
        })
    }

    /// Name of the node, which WKT1 places as the first quoted value.
    pub fn name(&self) -> Option<&str> {
        match self.values.first() {
            Some(WktValue::Text(text)) => Some(text),
            _ => None,
        }
    }

    /// Numeric value at `index`.
    pub fn number(&self, index: usize) -> Option<f64> {
        match self.values.get(index) {
            Some(WktValue::Number(value)) => Some(*value),
            _ => None,
        }
    }

    /// All numeric values in order, skipping text and nested nodes.
    pub fn numbers(&self) -> Vec<f64> {
        self.values
            .iter()
            .filter_map(|value| match value {
                WktValue::Number(value) => Some(*value),
                _ => None,
            })
            .collect()
    }
}

struct Reader<'a> {
    input: &'a [u8],
    position: usize,
}

impl Reader<'_> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.position).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_whitespace()) {
            self.position += 1;
        }
    }

    fn value(&mut self) -> Result<WktValue, String> {
        self.skip_whitespace();
        match self.peek() {
            Some(b'"') => self.text().map(WktValue::Text),
            Some(c) if c == b'-' || c == b'+' || c == b'.' || c.is_ascii_digit() => {
                self.number().map(WktValue::Number)
            }
            Some(c) if c.is_ascii_alphabetic() || c == b'_' => {
                let word = self.word();
                self.skip_whitespace();
                match self.peek() {
                    Some(b'[') | Some(b'(') => self.node(word).map(WktValue::Node),
                    _ => Ok(WktValue::Word(word)),
                }
            }
            Some(c) => Err(format!(
                "unexpected character '{}' at {}",
                c as char, self.position
            )),
            None => Err("unexpected end of input".into()),
        }
    }

    fn node(&mut self, keyword: String) -> Result<WktNode, String> {
        let close = match self.peek() {
            Some(b'[') => b']',
            Some(b'(') => b')',
            _ => return Err(format!("expected '[' after {keyword}")),
        };
        self.position += 1;

        let mut values = vec![];
        self.skip_whitespace();
        if self.peek() == Some(close) {
            self.position += 1;
            return Ok(WktNode { keyword, values });
        }

        loop {
            values.push(self.value()?);
            self.skip_whitespace();
            match self.peek() {
                Some(b',') => self.position += 1,
                Some(c) if c == close => {
                    self.position += 1;
                    break;
                }
                Some(c) => {
                    return Err(format!(
                        "unexpected character '{}' in {keyword} at {}",
                        c as char, self.position
                    ))
                }
                None => return Err(format!("{keyword} is not closed")),
            }
        }

        Ok(WktNode { keyword, values })
    }

    fn word(&mut self) -> String {
        let start = self.position;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_')
        {
            self.position += 1;
        }

        String::from_utf8_lossy(&self.input[start..self.position]).into_owned()
    }

    fn text(&mut self) -> Result<String, String> {
        // Opening quote.
        self.position += 1;
        let mut bytes = vec![];
        loop {
            match self.peek() {
                Some(b'"') if self.input.get(self.position + 1) == Some(&b'"') => {
                    bytes.push(b'"');
                    self.position += 2;
                }
                Some(b'"') => {
                    self.position += 1;
                    break;
                }
                Some(c) => {
                    bytes.push(c);
                    self.position += 1;
                }
                None => return Err("unterminated quoted text".into()),
            }
        }

        String::from_utf8(bytes).map_err(|err| err.to_string())
    }

    fn number(&mut self) -> Result<f64, String> {
        let start = self.position;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, b'-' | b'+' | b'.' | b'e' | b'E'))
        {
            self.position += 1;
        }

        let text = String::from_utf8_lossy(&self.input[start..self.position]);
        text.parse()
            .map_err(|_| format!("invalid number '{text}' at {start}"))
    }
}
