//! `Link` 標頭解析（RFC 8288 的簡化子集）。
//!
//! 伺服器以 `Link` 標頭公布服務條款（`rel="terms-of-service"`）與
//! 中繼憑證（`rel="up"`）的位置。

use crate::transport::Response;

/// 單一連結：目標 URL 與其 `rel` 關係列表。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub url: String,
    pub rels: Vec<String>,
}

impl Link {
    pub fn has_rel(&self, rel: &str) -> bool {
        self.rels.iter().any(|r| r.eq_ignore_ascii_case(rel))
    }
}

/// 解析一個 `Link` 標頭值，值中可以包含以逗號分隔的多個連結。
///
/// 連結目標取角括號之間的內容，`rel` 可以是以空白分隔的多個關係。
pub fn parse(value: &str) -> Vec<Link> {
    let mut links = Vec::new();
    let mut rest = value;

    while let Some(start) = rest.find('<') {
        let Some(len) = rest[start..].find('>') else {
            break;
        };
        let url = rest[start + 1..start + len].trim().to_string();
        rest = &rest[start + len + 1..];

        // 參數延續到下一個不在引號內的逗號
        let mut in_quotes = false;
        let mut params_end = rest.len();
        for (i, c) in rest.char_indices() {
            match c {
                '"' => in_quotes = !in_quotes,
                ',' if !in_quotes => {
                    params_end = i;
                    break;
                }
                _ => {}
            }
        }
        let params = &rest[..params_end];
        rest = &rest[params_end..];

        let rels = params
            .split(';')
            .filter_map(|param| {
                let (name, value) = param.split_once('=')?;
                name.trim()
                    .eq_ignore_ascii_case("rel")
                    .then(|| value.trim().trim_matches('"').to_string())
            })
            .flat_map(|rel| {
                rel.split_whitespace()
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect();

        links.push(Link { url, rels });
    }

    links
}

/// 在回應的所有 `Link` 標頭中尋找第一個符合 `rel` 的連結。
pub fn find(response: &Response, rel: &str) -> Option<String> {
    response
        .header_all("link")
        .into_iter()
        .flat_map(parse)
        .find(|link| link.has_rel(rel))
        .map(|link| link.url)
}
