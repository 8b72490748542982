// Signature deciphering against the platform player script
//
// Ciphered formats carry `signatureCipher = s=<scrambled>&sp=<param>&url=<base>`.
// The player script scrambles signatures with a short program built from
// three primitives (reverse, splice, swap); we recover that program with
// regexes and replay it on the scrambled value.

use regex::Regex;
use url::Url;

use crate::capture::utils::set_query_param;

lazy_static::lazy_static! {
    static ref DECIPHER_FN_RE: Regex = Regex::new(
        r#"(?s)[a-zA-Z0-9_$]+\s*=\s*function\(\s*a\s*\)\s*\{\s*a\s*=\s*a\.split\(\s*""\s*\)\s*;(.*?)return\s+a\.join\(\s*""\s*\)"#
    ).unwrap();
    static ref CALL_RE: Regex = Regex::new(
        r#"([a-zA-Z0-9_$]+)(?:\.([a-zA-Z0-9_$]+)|\["([a-zA-Z0-9_$]+)"\])\(\s*a\s*(?:,\s*(\d+)\s*)?\)"#
    ).unwrap();
    static ref METHOD_RE: Regex = Regex::new(
        r#"(?s)"?([a-zA-Z0-9_$]+)"?\s*:\s*function\s*\([a-zA-Z,\s]*\)\s*\{([^}]*)\}"#
    ).unwrap();
    static ref SIGNATURE_TIMESTAMP_RE: Regex = Regex::new(
        r"(?:signatureTimestamp|sts)\s*:\s*(\d{5})"
    ).unwrap();
    static ref PLAYER_ID_RE: Regex = Regex::new(
        r"player\\?/([0-9a-fA-F]{8})\\?/"
    ).unwrap();
}

/// One primitive of the signature program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureOp {
    Reverse,
    Splice(usize),
    Swap(usize),
}

impl SignatureOp {
    fn apply(&self, chars: &mut Vec<char>) {
        match *self {
            Self::Reverse => chars.reverse(),
            Self::Splice(n) => {
                let n = n.min(chars.len());
                chars.drain(..n);
            }
            Self::Swap(n) => {
                if !chars.is_empty() {
                    let idx = n % chars.len();
                    chars.swap(0, idx);
                }
            }
        }
    }
}

/// Player script facts needed to resolve ciphered formats
#[derive(Debug, Clone)]
pub struct PlayerContext {
    pub player_id: String,
    pub signature_timestamp: Option<u32>,
    pub operations: Vec<SignatureOp>,
}

impl PlayerContext {
    /// Extract the signature program from a player script
    pub fn parse(player_id: &str, script: &str) -> Result<Self, String> {
        let body = DECIPHER_FN_RE
            .captures(script)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .ok_or_else(|| "signature function not found in player script".to_string())?;

        let calls: Vec<(String, String, Option<usize>)> = CALL_RE
            .captures_iter(body)
            .filter_map(|c| {
                let object = c.get(1)?.as_str().to_string();
                let method = c.get(2).or_else(|| c.get(3))?.as_str().to_string();
                let arg = c.get(4).and_then(|m| m.as_str().parse().ok());
                Some((object, method, arg))
            })
            .collect();

        let helper = calls
            .first()
            .map(|(object, _, _)| object.clone())
            .ok_or_else(|| "signature function has no transform calls".to_string())?;

        let helper_re = Regex::new(&format!(
            r"(?s)var\s+{}\s*=\s*\{{(.*?)\}}\s*;",
            regex::escape(&helper)
        ))
        .map_err(|e| format!("invalid helper pattern: {}", e))?;
        let helper_body = helper_re
            .captures(script)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .ok_or_else(|| format!("helper object {} not found in player script", helper))?;

        let methods: Vec<(String, MethodKind)> = METHOD_RE
            .captures_iter(helper_body)
            .filter_map(|c| {
                let name = c.get(1)?.as_str().to_string();
                let kind = MethodKind::classify(c.get(2)?.as_str())?;
                Some((name, kind))
            })
            .collect();

        let mut operations = Vec::with_capacity(calls.len());
        for (object, method, arg) in calls {
            if object != helper {
                return Err(format!("unexpected transform object {}", object));
            }
            let kind = methods
                .iter()
                .find(|(name, _)| *name == method)
                .map(|(_, kind)| *kind)
                .ok_or_else(|| format!("transform {}.{} not understood", object, method))?;
            operations.push(kind.to_op(arg.unwrap_or(0)));
        }

        let signature_timestamp = SIGNATURE_TIMESTAMP_RE
            .captures(script)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok());

        Ok(Self {
            player_id: player_id.to_string(),
            signature_timestamp,
            operations,
        })
    }

    /// Replay the signature program
    pub fn decipher_signature(&self, scrambled: &str) -> String {
        let mut chars: Vec<char> = scrambled.chars().collect();
        for op in &self.operations {
            op.apply(&mut chars);
        }
        chars.into_iter().collect()
    }

    /// Turn a `signatureCipher` descriptor into a fetchable URL
    pub fn resolve_cipher(&self, signature_cipher: &str) -> Result<String, String> {
        let mut scrambled = None;
        let mut param = None;
        let mut base_url = None;
        for (key, value) in url::form_urlencoded::parse(signature_cipher.as_bytes()) {
            match key.as_ref() {
                "s" => scrambled = Some(value.into_owned()),
                "sp" => param = Some(value.into_owned()),
                "url" => base_url = Some(value.into_owned()),
                _ => {}
            }
        }

        let scrambled = scrambled.ok_or_else(|| "cipher has no signature".to_string())?;
        let base_url = base_url.ok_or_else(|| "cipher has no url".to_string())?;
        let param = param.unwrap_or_else(|| "signature".to_string());

        let mut url =
            Url::parse(&base_url).map_err(|e| format!("cipher url is invalid: {}", e))?;
        set_query_param(&mut url, &param, &self.decipher_signature(&scrambled));
        Ok(url.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MethodKind {
    Reverse,
    Splice,
    Swap,
}

impl MethodKind {
    fn classify(body: &str) -> Option<Self> {
        if body.contains("reverse") {
            Some(Self::Reverse)
        } else if body.contains("splice") {
            Some(Self::Splice)
        } else if body.contains("a[0]") {
            Some(Self::Swap)
        } else {
            None
        }
    }

    fn to_op(self, arg: usize) -> SignatureOp {
        match self {
            Self::Reverse => SignatureOp::Reverse,
            Self::Splice => SignatureOp::Splice(arg),
            Self::Swap => SignatureOp::Swap(arg),
        }
    }
}

/// Player id referenced by the iframe API loader script
pub fn find_player_id(iframe_api: &str) -> Option<String> {
    PLAYER_ID_RE
        .captures(iframe_api)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}
