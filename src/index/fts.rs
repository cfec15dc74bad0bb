/*!
Full-text index (spec §4.5): a BM25-ranked inverted index over tokenized,
stemmed text, searched with a small boolean query language supporting `AND`,
`OR`, `NOT`, `+`/`-` prefixes, quoted phrases, parentheses, and implicit OR
with AND binding tighter than OR.
*/

use std::collections::{HashMap, HashSet};

use rust_stemmers::{Algorithm, Stemmer};

use crate::error::{ParqueError, Result};

const BM25_K1: f64 = 1.2;
const BM25_B: f64 = 0.75;

fn tokenize(text: &str) -> Vec<String> {
    let stemmer = Stemmer::create(Algorithm::English);
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| stemmer.stem(&t.to_lowercase()).into_owned())
        .collect()
}

#[derive(Debug, Clone)]
struct Posting {
    doc_id: Vec<u8>,
    row_group: u16,
    row_offset: u64,
    term_freq: u32,
}

#[derive(Debug, Default)]
struct DocumentStats {
    length: u32,
}

/// BM25-ranked full-text index over one field.
#[derive(Debug, Default)]
pub struct FtsIndex {
    field: String,
    postings: HashMap<String, Vec<Posting>>,
    doc_stats: HashMap<Vec<u8>, DocumentStats>,
    total_doc_length: u64,
}

/// One ranked search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub doc_id: Vec<u8>,
    pub row_group: u16,
    pub row_offset: u64,
    pub score: f64,
}

impl FtsIndex {
    pub fn new(field: impl Into<String>) -> Self {
        FtsIndex {
            field: field.into(),
            postings: HashMap::new(),
            doc_stats: HashMap::new(),
            total_doc_length: 0,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// Index (or re-index) one document's text.
    pub fn index_document(
        &mut self,
        doc_id: Vec<u8>,
        row_group: u16,
        row_offset: u64,
        text: &str,
    ) {
        self.remove_doc(&doc_id);

        let tokens = tokenize(text);
        let length = tokens.len() as u32;
        let mut term_freqs: HashMap<String, u32> = HashMap::new();
        for token in tokens {
            *term_freqs.entry(token).or_insert(0) += 1;
        }
        for (term, freq) in term_freqs {
            self.postings.entry(term).or_default().push(Posting {
                doc_id: doc_id.clone(),
                row_group,
                row_offset,
                term_freq: freq,
            });
        }
        self.doc_stats.insert(doc_id, DocumentStats { length });
        self.total_doc_length += length as u64;
    }

    /// Remove a document's postings and stats, if present.
    pub fn remove_doc(&mut self, doc_id: &[u8]) {
        if let Some(stats) = self.doc_stats.remove(doc_id) {
            self.total_doc_length = self.total_doc_length.saturating_sub(stats.length as u64);
        }
        for postings in self.postings.values_mut() {
            postings.retain(|p| p.doc_id != doc_id);
        }
        self.postings.retain(|_, v| !v.is_empty());
    }

    fn doc_count(&self) -> usize {
        self.doc_stats.len()
    }

    fn avg_doc_length(&self) -> f64 {
        if self.doc_stats.is_empty() {
            0.0
        } else {
            self.total_doc_length as f64 / self.doc_stats.len() as f64
        }
    }

    fn idf(&self, term: &str) -> f64 {
        let n = self.doc_count() as f64;
        let df = self.postings.get(term).map(|p| p.len()).unwrap_or(0) as f64;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    fn bm25_term_score(&self, term: &str, posting: &Posting) -> f64 {
        let idf = self.idf(term);
        let tf = posting.term_freq as f64;
        let doc_len = self
            .doc_stats
            .get(&posting.doc_id)
            .map(|s| s.length as f64)
            .unwrap_or(0.0);
        let avg_len = self.avg_doc_length().max(1.0);
        idf * (tf * (BM25_K1 + 1.0)) / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * doc_len / avg_len))
    }

    /// Parse and execute a boolean query, returning BM25-ranked hits.
    pub fn search(&self, query: &str) -> Result<Vec<Hit>> {
        let expr = parse_query(query)?;
        let mut scores: HashMap<Vec<u8>, f64> = HashMap::new();
        let mut locations: HashMap<Vec<u8>, (u16, u64)> = HashMap::new();
        self.eval(&expr, &mut scores, &mut locations)?;

        let mut hits: Vec<Hit> = scores
            .into_iter()
            .map(|(doc_id, score)| {
                let (row_group, row_offset) = locations[&doc_id];
                Hit {
                    doc_id,
                    row_group,
                    row_offset,
                    score,
                }
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(hits)
    }

    fn docs_matching_term(&self, term: &str) -> HashSet<Vec<u8>> {
        let stemmed = Stemmer::create(Algorithm::English).stem(&term.to_lowercase()).into_owned();
        self.postings
            .get(&stemmed)
            .map(|postings| postings.iter().map(|p| p.doc_id.clone()).collect())
            .unwrap_or_default()
    }

    fn docs_matching_phrase(&self, phrase: &str) -> HashSet<Vec<u8>> {
        let terms = tokenize(phrase);
        if terms.is_empty() {
            return HashSet::new();
        }
        let mut sets = terms.iter().map(|t| {
            self.postings
                .get(t)
                .map(|postings| postings.iter().map(|p| p.doc_id.clone()).collect::<HashSet<_>>())
                .unwrap_or_default()
        });
        let mut intersection = sets.next().unwrap_or_default();
        for set in sets {
            intersection = intersection.intersection(&set).cloned().collect();
        }
        intersection
    }

    fn eval(
        &self,
        expr: &Query,
        scores: &mut HashMap<Vec<u8>, f64>,
        locations: &mut HashMap<Vec<u8>, (u16, u64)>,
    ) -> Result<HashSet<Vec<u8>>> {
        match expr {
            Query::Term(term) => {
                let docs = self.docs_matching_term(term);
                self.accumulate(term, &docs, scores, locations);
                Ok(docs)
            }
            Query::Phrase(phrase) => {
                let docs = self.docs_matching_phrase(phrase);
                for term in tokenize(phrase) {
                    self.accumulate(&term, &docs, scores, locations);
                }
                Ok(docs)
            }
            Query::And(left, right) => {
                let l = self.eval(left, scores, locations)?;
                let r = self.eval(right, scores, locations)?;
                Ok(l.intersection(&r).cloned().collect())
            }
            Query::Or(left, right) => {
                let l = self.eval(left, scores, locations)?;
                let r = self.eval(right, scores, locations)?;
                Ok(l.union(&r).cloned().collect())
            }
            Query::Not(inner) => {
                let excluded = self.eval(inner, &mut HashMap::new(), &mut HashMap::new())?;
                let all: HashSet<Vec<u8>> = self.doc_stats.keys().cloned().collect();
                let remaining: HashSet<Vec<u8>> = all.difference(&excluded).cloned().collect();
                for doc in &remaining {
                    scores.entry(doc.clone()).or_insert(0.0);
                }
                Ok(remaining)
            }
        }
    }

    fn accumulate(
        &self,
        term: &str,
        docs: &HashSet<Vec<u8>>,
        scores: &mut HashMap<Vec<u8>, f64>,
        locations: &mut HashMap<Vec<u8>, (u16, u64)>,
    ) {
        if let Some(postings) = self.postings.get(term) {
            for posting in postings {
                if !docs.contains(&posting.doc_id) {
                    continue;
                }
                let score = self.bm25_term_score(term, posting);
                *scores.entry(posting.doc_id.clone()).or_insert(0.0) += score;
                locations
                    .entry(posting.doc_id.clone())
                    .or_insert((posting.row_group, posting.row_offset));
            }
        }
    }
}

#[derive(Debug, Clone)]
enum Query {
    Term(String),
    Phrase(String),
    And(Box<Query>, Box<Query>),
    Or(Box<Query>, Box<Query>),
    Not(Box<Query>),
}

/// Parses: implicit-OR at the top, `AND`/`+` binds tighter than `OR`,
/// `NOT`/`-` negates the following atom, quoted strings are phrases, and
/// parentheses group. Grounded on the same recursive-descent shape used by
/// the filter-expression parser in the query module.
fn parse_query(input: &str) -> Result<Query> {
    let tokens = lex(input)?;
    let mut pos = 0;
    let expr = parse_or(&tokens, &mut pos)?;
    if pos != tokens.len() {
        return Err(ParqueError::Decode("unexpected trailing tokens in fts query".to_string()));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    And,
    Or,
    Not,
    LParen,
    RParen,
    Word(String),
    Phrase(String),
}

fn lex(input: &str) -> Result<Vec<Tok>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '(' => {
                tokens.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Tok::RParen);
                i += 1;
            }
            '+' => {
                tokens.push(Tok::And);
                i += 1;
            }
            '-' => {
                tokens.push(Tok::Not);
                i += 1;
            }
            '"' => {
                let start = i + 1;
                let mut j = start;
                while j < chars.len() && chars[j] != '"' {
                    j += 1;
                }
                if j >= chars.len() {
                    return Err(ParqueError::Decode("unterminated phrase in fts query".to_string()));
                }
                tokens.push(Tok::Phrase(chars[start..j].iter().collect()));
                i = j + 1;
            }
            _ => {
                let start = i;
                while i < chars.len() && !chars[i].is_whitespace() && !"()\"".contains(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match word.as_str() {
                    "AND" => tokens.push(Tok::And),
                    "OR" => tokens.push(Tok::Or),
                    "NOT" => tokens.push(Tok::Not),
                    _ => tokens.push(Tok::Word(word)),
                }
            }
        }
    }
    Ok(tokens)
}

fn parse_or(tokens: &[Tok], pos: &mut usize) -> Result<Query> {
    let mut left = parse_and(tokens, pos)?;
    loop {
        match tokens.get(*pos) {
            Some(Tok::Or) => {
                *pos += 1;
                let right = parse_and(tokens, pos)?;
                left = Query::Or(Box::new(left), Box::new(right));
            }
            // Implicit OR: two adjacent atoms with no connective.
            Some(Tok::Word(_)) | Some(Tok::Phrase(_)) | Some(Tok::LParen) | Some(Tok::Not) => {
                let right = parse_and(tokens, pos)?;
                left = Query::Or(Box::new(left), Box::new(right));
            }
            _ => break,
        }
    }
    Ok(left)
}

fn parse_and(tokens: &[Tok], pos: &mut usize) -> Result<Query> {
    let mut left = parse_not(tokens, pos)?;
    while matches!(tokens.get(*pos), Some(Tok::And)) {
        *pos += 1;
        let right = parse_not(tokens, pos)?;
        left = Query::And(Box::new(left), Box::new(right));
    }
    Ok(left)
}

fn parse_not(tokens: &[Tok], pos: &mut usize) -> Result<Query> {
    if matches!(tokens.get(*pos), Some(Tok::Not)) {
        *pos += 1;
        let inner = parse_atom(tokens, pos)?;
        return Ok(Query::Not(Box::new(inner)));
    }
    parse_atom(tokens, pos)
}

fn parse_atom(tokens: &[Tok], pos: &mut usize) -> Result<Query> {
    match tokens.get(*pos) {
        Some(Tok::Word(word)) => {
            *pos += 1;
            Ok(Query::Term(word.clone()))
        }
        Some(Tok::Phrase(phrase)) => {
            *pos += 1;
            Ok(Query::Phrase(phrase.clone()))
        }
        Some(Tok::LParen) => {
            *pos += 1;
            let inner = parse_or(tokens, pos)?;
            if !matches!(tokens.get(*pos), Some(Tok::RParen)) {
                return Err(ParqueError::Decode("unmatched parenthesis in fts query".to_string()));
            }
            *pos += 1;
            Ok(inner)
        }
        other => Err(ParqueError::Decode(format!(
            "unexpected token in fts query: {other:?}"
        ))),
    }
}
