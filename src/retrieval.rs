//! Keyword retrieval over the advisor knowledge corpus
//!
//! Term-frequency scoring over a small fixed set of home-buying notes.
//! Deterministic for a given query: ties break on corpus order. Exposed
//! to the chat model as the `search_knowledge` tool.

use serde::Serialize;

/// One corpus document.
#[derive(Debug, Clone, Copy)]
pub struct Document {
    pub title: &'static str,
    pub body: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredDocument {
    pub title: String,
    pub body: String,
    pub score: f64,
}

/// Fixed advisor knowledge base. Compiled in; versioned with the tool
/// schemas.
pub const CORPUS: &[Document] = &[
    Document {
        title: "Loan program overview",
        body: "Conventional loans need a 620 credit score and favor 20 percent down. \
               FHA loans accept 580 scores with 3.5 percent down but carry mortgage \
               insurance for the life of the loan. VA loans require no down payment \
               and no mortgage insurance for eligible veterans and service members.",
    },
    Document {
        title: "Closing costs",
        body: "Closing costs typically run 2 to 5 percent of the purchase price and \
               cover lender fees, title insurance, appraisal, and prepaid taxes. \
               Sellers can contribute toward closing costs within program limits.",
    },
    Document {
        title: "Private mortgage insurance",
        body: "PMI applies to conventional loans with less than 20 percent down. It \
               usually costs 0.3 to 1.5 percent of the loan per year and can be \
               removed once the loan reaches 80 percent of the home value.",
    },
    Document {
        title: "Credit score impact",
        body: "A higher credit score lowers the mortgage rate offered. Moving from \
               the 660 tier to the 740 tier often saves a quarter to half a percent, \
               which compounds to tens of thousands over a 30 year loan.",
    },
    Document {
        title: "Home inspection",
        body: "An inspection costs a few hundred dollars and surfaces structural, \
               roof, plumbing, and electrical problems before closing. Findings can \
               justify repair credits or renegotiating the price.",
    },
    Document {
        title: "Debt-to-income ratios",
        body: "Lenders compare housing costs and total debt to gross monthly income. \
               The common guideline is 28 percent for housing and 36 percent total; \
               43 percent is the usual hard ceiling for a qualified mortgage.",
    },
];

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.len() > 2)
        .map(|token| token.to_string())
        .collect()
}

/// Rank corpus documents for `query` by term frequency.
pub fn retrieve(query: &str, top_k: usize) -> Vec<ScoredDocument> {
    let query_terms = tokenize(query);
    if query_terms.is_empty() || top_k == 0 {
        return Vec::new();
    }

    let mut scored: Vec<(usize, f64)> = CORPUS
        .iter()
        .enumerate()
        .map(|(index, doc)| {
            let doc_terms = tokenize(&format!("{} {}", doc.title, doc.body));
            let hits: usize = query_terms
                .iter()
                .map(|term| doc_terms.iter().filter(|t| *t == term).count())
                .sum();
            let score = hits as f64 / doc_terms.len() as f64;
            (index, score)
        })
        .filter(|(_, score)| *score > 0.0)
        .collect();

    // Score descending, corpus order as the deterministic tie-break.
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    scored
        .into_iter()
        .take(top_k)
        .map(|(index, score)| ScoredDocument {
            title: CORPUS[index].title.to_string(),
            body: CORPUS[index].body.to_string(),
            score,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrieve_finds_pmi_note() {
        let results = retrieve("how do I remove PMI mortgage insurance", 3);
        assert!(!results.is_empty());
        assert_eq!(results[0].title, "Private mortgage insurance");
    }

    #[test]
    fn test_retrieve_is_deterministic() {
        let a = retrieve("closing costs and fees", 5);
        let b = retrieve("closing costs and fees", 5);
        let titles_a: Vec<_> = a.iter().map(|d| &d.title).collect();
        let titles_b: Vec<_> = b.iter().map(|d| &d.title).collect();
        assert_eq!(titles_a, titles_b);
    }

    #[test]
    fn test_retrieve_respects_top_k_and_empty_query() {
        assert!(retrieve("", 3).is_empty());
        assert!(retrieve("loan", 0).is_empty());
        assert!(retrieve("loan credit down payment", 2).len() <= 2);
    }
}
