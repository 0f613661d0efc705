use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use roaring::RoaringTreemap;
use tracing::debug;
use crate::analysis::Tokenizer;
use crate::core::error::{Error, Result};
use crate::core::types::{DocId, HitPos, WordId, MAX_FIELDS, MAX_QUERY_WORDS};
use crate::dict::Dictionary;
use crate::index::format::{Docinfo, WordEntry};
use crate::index::reader::{Index, Posting};
use crate::schema::{Row, Schema};
use crate::search::filter::BoundFilter;
use crate::search::parser::{parse_query, QueryNode};
use crate::search::query::{MatchMode, Query, QueryResult, WordStat};
use crate::search::ranker::{QueryHit, Ranker};
use crate::sorter::{create_sorter, GeoLocator, Match, MatchSorter};
use crate::source::InfixMode;

const ALL_FIELDS: u32 = u32::MAX;

/// Distinct query word with its postings.
struct QueryWord {
    text: String,
    entry: Option<WordEntry>,
    postings: Vec<Posting>,
    docs: RoaringTreemap,
    /// Query positions this word occurs at
    qpos: Vec<u32>,
}

impl QueryWord {
    fn posting(&self, doc_id: DocId) -> Option<&Posting> {
        self.postings
            .binary_search_by_key(&doc_id, |p| p.doc_id)
            .ok()
            .map(|i| &self.postings[i])
    }
}

/// Match tree over resolved query words.
#[derive(Debug, Clone, PartialEq)]
enum Node {
    Word { word: usize, fields: u32 },
    /// Words with their query positions; proximity 0 means exact
    Phrase { words: Vec<(usize, u32)>, proximity: u32, fields: u32 },
    And(Vec<Node>),
    Or(Vec<Node>),
    Not(Box<Node>),
}

fn in_fields(pos: u32, fields: u32) -> bool {
    let field = HitPos(pos).field();
    field < MAX_FIELDS && fields & (1 << field) != 0
}

struct Planner<'q, 't> {
    index: &'q Index,
    tokenizer: &'q Tokenizer<'t>,
    dict: &'q dyn Dictionary,
    schema: &'q Schema,
    words: Vec<QueryWord>,
    by_id: HashMap<WordId, usize>,
    qpos: u32,
    truncated: bool,
}

impl<'q, 't> Planner<'q, 't> {
    fn new(index: &'q Index, tokenizer: &'q Tokenizer<'t>, dict: &'q dyn Dictionary) -> Self {
        Planner {
            index,
            tokenizer,
            dict,
            schema: index.schema(),
            words: Vec::new(),
            by_id: HashMap::new(),
            qpos: 0,
            truncated: false,
        }
    }

    fn lookup(&self, word_id: WordId, raw: &[u8]) -> Result<Option<(WordId, WordEntry)>> {
        if let Some(entry) = self.index.word_entry(word_id)? {
            return Ok(Some((word_id, entry)));
        }
        // infix indexes also hold raw prefixes and infixes
        if self.index.header().analysis.infix_mode != InfixMode::None {
            if let Some(raw_id) = self.dict.word_id_raw(raw) {
                if let Some(entry) = self.index.word_entry(raw_id)? {
                    return Ok(Some((raw_id, entry)));
                }
            }
        }
        Ok(None)
    }

    fn add_word(&mut self, word_id: WordId, word: &[u8], raw: &[u8], qpos: u32) -> Result<Option<usize>> {
        let found = self.lookup(word_id, raw)?;
        let key = found.map_or(word_id, |(id, _)| id);
        if let Some(&i) = self.by_id.get(&key) {
            self.words[i].qpos.push(qpos);
            return Ok(Some(i));
        }
        if self.words.len() >= MAX_QUERY_WORDS {
            self.truncated = true;
            return Ok(None);
        }
        let entry = found.map(|(_, e)| e);
        let postings = match &entry {
            Some(entry) => self.index.doclist(entry).collect::<Result<Vec<Posting>>>()?,
            None => Vec::new(),
        };
        let docs: RoaringTreemap = postings.iter().map(|p| p.doc_id.0).collect();
        self.by_id.insert(key, self.words.len());
        self.words.push(QueryWord {
            text: String::from_utf8_lossy(word).into_owned(),
            entry,
            postings,
            docs,
            qpos: vec![qpos],
        });
        Ok(Some(self.words.len() - 1))
    }

    /// Accepted tokens of `text` as (word, query position). Stopwords
    /// still take up a query position.
    fn tokens(&mut self, text: &str) -> Result<Vec<(usize, u32)>> {
        let mut tok = self.tokenizer.spawn();
        tok.set_buffer(text.as_bytes(), true);
        let mut out = Vec::new();
        while let Some(token) = tok.next_token() {
            let raw = token.to_vec();
            let qpos = self.qpos;
            self.qpos += 1;
            let mut word = raw.clone();
            let Some(word_id) = self.dict.word_id(&mut word) else {
                continue;
            };
            if let Some(i) = self.add_word(word_id, &word, &raw, qpos)? {
                out.push((i, qpos));
            }
        }
        Ok(out)
    }

    fn field_mask(&self, names: &[String]) -> Result<u32> {
        let mut mask = 0u32;
        for name in names {
            let field = self
                .schema
                .field_index(name)
                .ok_or_else(|| Error::query(format!("query references unknown field '{}'", name)))?;
            mask |= 1 << field;
        }
        Ok(mask)
    }

    fn words_node(tokens: Vec<(usize, u32)>, fields: u32, phrase: Option<u32>) -> Option<Node> {
        match (tokens.len(), phrase) {
            (0, _) => None,
            (1, _) => Some(Node::Word { word: tokens[0].0, fields }),
            (_, Some(proximity)) => Some(Node::Phrase { words: tokens, proximity, fields }),
            (_, None) => Some(Node::And(
                tokens.into_iter().map(|(word, _)| Node::Word { word, fields }).collect(),
            )),
        }
    }

    fn group(children: Vec<Node>, and: bool) -> Option<Node> {
        match children.len() {
            0 => None,
            1 if !matches!(children[0], Node::Not(_)) => children.into_iter().next(),
            _ if and => Some(Node::And(children)),
            _ => Some(Node::Or(children)),
        }
    }

    fn lower(&mut self, node: &QueryNode, fields: u32) -> Result<Option<Node>> {
        Ok(match node {
            QueryNode::Term(text) => {
                let tokens = self.tokens(text)?;
                Self::words_node(tokens, fields, None)
            }
            QueryNode::Phrase { text, proximity } => {
                let tokens = self.tokens(text)?;
                Self::words_node(tokens, fields, Some(*proximity))
            }
            QueryNode::Field { fields: names, node } => {
                let mask = self.field_mask(names)?;
                self.lower(node, mask)?
            }
            QueryNode::And(children) | QueryNode::Or(children) => {
                let mut lowered = Vec::with_capacity(children.len());
                for child in children {
                    if let Some(node) = self.lower(child, fields)? {
                        lowered.push(node);
                    }
                }
                Self::group(lowered, matches!(node, QueryNode::And(_)))
            }
            QueryNode::Not(child) => self.lower(child, fields)?.map(|n| Node::Not(Box::new(n))),
        })
    }

    fn plan(&mut self, query: &Query) -> Result<Option<Node>> {
        match query.mode {
            MatchMode::All => {
                let tokens = self.tokens(&query.text)?;
                Ok(Self::words_node(tokens, ALL_FIELDS, None))
            }
            MatchMode::Any => {
                let tokens = self.tokens(&query.text)?;
                let words = tokens
                    .into_iter()
                    .map(|(word, _)| Node::Word { word, fields: ALL_FIELDS })
                    .collect();
                Ok(Self::group(words, false))
            }
            MatchMode::Phrase => {
                let tokens = self.tokens(&query.text)?;
                Ok(Self::words_node(tokens, ALL_FIELDS, Some(0)))
            }
            MatchMode::Boolean | MatchMode::Extended => {
                let tree = parse_query(&query.text, query.mode == MatchMode::Extended)?;
                self.lower(&tree, ALL_FIELDS)
            }
        }
    }
}

/// Candidate documents of a node. Negations only narrow a conjunction.
fn candidates(node: &Node, words: &[QueryWord]) -> Result<RoaringTreemap> {
    match node {
        Node::Word { word, .. } => Ok(words[*word].docs.clone()),
        Node::Phrase { words: slots, .. } => {
            let mut docs = words[slots[0].0].docs.clone();
            for (word, _) in &slots[1..] {
                docs &= &words[*word].docs;
            }
            Ok(docs)
        }
        Node::And(children) => {
            let mut docs: Option<RoaringTreemap> = None;
            let mut excluded = RoaringTreemap::new();
            for child in children {
                match child {
                    Node::Not(inner) => excluded |= candidates(inner, words)?,
                    _ => {
                        let set = candidates(child, words)?;
                        docs = Some(match docs {
                            Some(d) => d & set,
                            None => set,
                        });
                    }
                }
            }
            let docs = docs.ok_or_else(|| Error::query("query is non-computable (only negated terms)"))?;
            Ok(docs - excluded)
        }
        Node::Or(children) => {
            let mut docs = RoaringTreemap::new();
            for child in children {
                if matches!(child, Node::Not(_)) {
                    return Err(Error::query("query is non-computable (negated term under OR)"));
                }
                docs |= candidates(child, words)?;
            }
            Ok(docs)
        }
        Node::Not(_) => Err(Error::query("query is non-computable (single NOT operator)")),
    }
}

/// Hit positions of every query word in one document.
struct DocHits {
    positions: Vec<Vec<u32>>,
}

impl DocHits {
    fn load(index: &Index, words: &[QueryWord], doc_id: DocId) -> Result<Self> {
        let mut positions = Vec::with_capacity(words.len());
        for word in words {
            positions.push(match word.posting(doc_id) {
                Some(posting) => index.positions(posting)?,
                None => Vec::new(),
            });
        }
        Ok(DocHits { positions })
    }

    fn exact_phrase(&self, slots: &[(usize, u32)], fields: u32) -> bool {
        let (first, base) = slots[0];
        self.positions[first].iter().filter(|&&p| in_fields(p, fields)).any(|&p| {
            slots[1..].iter().all(|&(word, qpos)| {
                self.positions[word].binary_search(&(p + (qpos - base))).is_ok()
            })
        })
    }

    /// Smallest window holding every phrase word must span fewer than
    /// `proximity + words` positions.
    fn near(&self, slots: &[(usize, u32)], proximity: u32, fields: u32) -> bool {
        let mut distinct: Vec<usize> = slots.iter().map(|(w, _)| *w).collect();
        distinct.sort_unstable();
        distinct.dedup();
        let need = distinct.len();
        let limit = proximity + need as u32;

        let mut hits: Vec<(u32, usize)> = Vec::new();
        for (slot, word) in distinct.iter().enumerate() {
            hits.extend(self.positions[*word].iter().filter(|&&p| in_fields(p, fields)).map(|&p| (p, slot)));
        }
        hits.sort_unstable();

        let mut counts = vec![0usize; need];
        let mut covered = 0;
        let mut left = 0;
        for right in 0..hits.len() {
            if HitPos(hits[right].0).field() != HitPos(hits[left].0).field() {
                counts.iter_mut().for_each(|c| *c = 0);
                covered = 0;
                left = right;
            }
            let slot = hits[right].1;
            if counts[slot] == 0 {
                covered += 1;
            }
            counts[slot] += 1;
            while covered == need {
                if hits[right].0 - hits[left].0 + 1 < limit {
                    return true;
                }
                let slot = hits[left].1;
                counts[slot] -= 1;
                if counts[slot] == 0 {
                    covered -= 1;
                }
                left += 1;
            }
        }
        false
    }

    fn eval(&self, node: &Node) -> bool {
        match node {
            Node::Word { word, fields } => self.positions[*word].iter().any(|&p| in_fields(p, *fields)),
            Node::Phrase { words, proximity: 0, fields } => self.exact_phrase(words, *fields),
            Node::Phrase { words, proximity, fields } => self.near(words, *proximity, *fields),
            Node::And(children) => children.iter().all(|c| self.eval(c)),
            Node::Or(children) => children.iter().any(|c| self.eval(c)),
            Node::Not(child) => !self.eval(child),
        }
    }

    fn query_hits(&self, words: &[QueryWord]) -> Vec<QueryHit> {
        let mut hits = Vec::new();
        for (word, positions) in self.positions.iter().enumerate() {
            for &qpos in &words[word].qpos {
                hits.extend(positions.iter().map(|&p| QueryHit { pos: HitPos(p), qpos, word }));
            }
        }
        hits
    }
}

fn field_weights(query: &Query, schema: &Schema, result: &mut QueryResult) -> Vec<u32> {
    let mut weights = vec![1u32; schema.fields().len()];
    for (name, weight) in &query.field_weights {
        match schema.field_index(name) {
            Some(i) => weights[i] = (*weight).max(1),
            None => result.add_warning(format!("field weight for unknown field '{}' ignored", name)),
        }
    }
    weights
}

impl Index {
    /// Runs `query` with this index's own tokenizer and dictionary and a
    /// sorter built from the query. Returns the requested window of
    /// matches.
    pub fn query(&self, query: &Query) -> Result<QueryResult> {
        let started = Instant::now();
        let tokenizer = self.tokenizer();
        let dict = Arc::clone(self.dictionary());
        let mut sorter = create_sorter(query, self.schema())?;
        let mut result = QueryResult::default();
        self.query_ex(&tokenizer, dict.as_ref(), query, &mut result, sorter.as_mut())?;
        let matches = sorter.flatten(None);
        result.set_window(matches, query.offset, query.limit);
        result.elapsed = started.elapsed();
        Ok(result)
    }

    /// Like [`Index::query`], but failures are reported through
    /// [`QueryResult::error`] instead.
    pub fn search(&self, query: &Query) -> QueryResult {
        self.query(query).unwrap_or_else(|e| QueryResult::failed(&e))
    }

    /// Pushes the matches of `query` into a caller-provided sorter.
    pub fn query_ex(
        &self,
        tokenizer: &Tokenizer<'_>,
        dict: &dyn Dictionary,
        query: &Query,
        result: &mut QueryResult,
        sorter: &mut dyn MatchSorter,
    ) -> Result<()> {
        self.multi_query(tokenizer, dict, query, result, &mut [sorter])
    }

    /// Evaluates `query` once and pushes every match into each sorter.
    ///
    /// `result` receives word statistics, warnings and the number of
    /// matching documents; matches stay in the sorters.
    pub fn multi_query(
        &self,
        tokenizer: &Tokenizer<'_>,
        dict: &dyn Dictionary,
        query: &Query,
        result: &mut QueryResult,
        sorters: &mut [&mut dyn MatchSorter],
    ) -> Result<()> {
        if dict.word_id_bits() != self.header().word_id_bits {
            return Err(Error::query(format!(
                "dictionary produces {}-bit ids, index uses {}-bit ids",
                dict.word_id_bits().bits(),
                self.header().word_id_bits.bits()
            )));
        }
        let schema = self.schema();
        let filters = BoundFilter::bind_all(&query.filters, schema)?;
        let geo = match &query.geo_anchor {
            Some(anchor) => Some(GeoLocator::bind(anchor, schema)?),
            None => None,
        };
        let needs_attrs = geo.is_some()
            || filters.iter().any(|f| f.uses_attrs())
            || sorters.iter().any(|s| s.uses_attrs());
        if needs_attrs && self.docinfo() == Docinfo::None {
            return Err(Error::query("index stores no attributes to filter, sort or group by"));
        }

        let mut planner = Planner::new(self, tokenizer, dict);
        let plan = planner.plan(query)?;
        if planner.truncated {
            result.add_warning(format!("query words beyond the first {} were ignored", MAX_QUERY_WORDS));
        }
        let words = planner.words;
        result.word_stats = words
            .iter()
            .map(|w| WordStat {
                word: w.text.clone(),
                docs: w.entry.map_or(0, |e| e.docs as u64),
                hits: w.entry.map_or(0, |e| e.hits as u64),
            })
            .collect();

        let Some(plan) = plan else {
            return Ok(());
        };
        let mandatory_missing = matches!(query.mode, MatchMode::All | MatchMode::Phrase)
            && words.iter().any(|w| w.entry.is_none());
        if mandatory_missing {
            return Ok(());
        }

        let docs = candidates(&plan, &words)?;
        let ranker = Ranker::new(query.mode, field_weights(query, schema, result), words.len());
        let attrs = self.attr_snapshot();
        let empty_row = Row::new(schema.row_size());
        let mut matched = 0u64;

        for id in docs.iter() {
            if id < query.min_id || id > query.max_id {
                continue;
            }
            let doc_id = DocId(id);
            let hits = DocHits::load(self, &words, doc_id)?;
            if !hits.eval(&plan) {
                continue;
            }

            let row = match self.docinfo() {
                Docinfo::None => Row::new(0),
                Docinfo::Extern => attrs.row_for(doc_id).unwrap_or_else(|| empty_row.clone()),
                Docinfo::Inline => words
                    .iter()
                    .find_map(|w| w.posting(doc_id))
                    .and_then(|p| self.row_for(&attrs, p))
                    .unwrap_or_else(|| empty_row.clone()),
            };
            if !filters.iter().all(|f| f.matches(doc_id, &row, |off| self.mva_values(off))) {
                continue;
            }

            let weight = ranker.weight(&mut hits.query_hits(&words));
            let mut m = Match::new(doc_id, weight, row);
            if let Some(geo) = &geo {
                m.geodist = geo.distance(&m.row);
            }
            matched += 1;
            for sorter in sorters.iter_mut() {
                sorter.push(m.clone());
            }
            if query.cutoff > 0 && matched >= query.cutoff as u64 {
                break;
            }
        }
        result.total += matched;
        debug!(
            index = %self.base().display(),
            words = words.len(),
            candidates = docs.len(),
            matched,
            "query evaluated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(ids: &[u64]) -> QueryWord {
        QueryWord {
            text: String::new(),
            entry: None,
            postings: Vec::new(),
            docs: ids.iter().copied().collect(),
            qpos: vec![0],
        }
    }

    fn w(word: usize) -> Node {
        Node::Word { word, fields: ALL_FIELDS }
    }

    #[test]
    fn candidate_algebra() {
        let words = vec![word(&[1, 2, 3]), word(&[2, 3, 4]), word(&[3])];
        let and = Node::And(vec![w(0), w(1), Node::Not(Box::new(w(2)))]);
        assert_eq!(candidates(&and, &words).unwrap().iter().collect::<Vec<_>>(), vec![2]);
        let or = Node::Or(vec![w(0), w(1)]);
        assert_eq!(candidates(&or, &words).unwrap().len(), 4);

        assert!(candidates(&Node::Not(Box::new(w(0))), &words).is_err());
        assert!(candidates(&Node::And(vec![Node::Not(Box::new(w(0)))]), &words).is_err());
        assert!(candidates(&Node::Or(vec![w(0), Node::Not(Box::new(w(1)))]), &words).is_err());
    }

    fn doc(positions: Vec<Vec<u32>>) -> DocHits {
        DocHits { positions }
    }

    #[test]
    fn phrase_and_proximity() {
        let p = |field, pos| HitPos::new(field, pos).0;
        // field 0: "a x b c", field 1: "c a"
        let hits = doc(vec![vec![p(0, 1), p(1, 2)], vec![p(0, 3)], vec![p(0, 4), p(1, 1)]]);

        let bc = Node::Phrase { words: vec![(1, 0), (2, 1)], proximity: 0, fields: ALL_FIELDS };
        assert!(hits.eval(&bc));
        let ab = Node::Phrase { words: vec![(0, 0), (1, 1)], proximity: 0, fields: ALL_FIELDS };
        assert!(!hits.eval(&ab));
        let ca = Node::Phrase { words: vec![(2, 0), (0, 1)], proximity: 0, fields: ALL_FIELDS };
        assert!(hits.eval(&ca));
        let ca_body = Node::Phrase { words: vec![(2, 0), (0, 1)], proximity: 0, fields: 1 };
        assert!(!hits.eval(&ca_body));

        // "a b" spans 3 positions in field 0
        let near = |proximity| Node::Phrase { words: vec![(0, 0), (1, 1)], proximity, fields: 1 };
        assert!(!hits.eval(&near(1)));
        assert!(hits.eval(&near(2)));
    }

    #[test]
    fn field_limited_words() {
        let hits = doc(vec![vec![HitPos::new(1, 5).0]]);
        assert!(hits.eval(&Node::Word { word: 0, fields: 0b10 }));
        assert!(!hits.eval(&Node::Word { word: 0, fields: 0b01 }));
    }
}
