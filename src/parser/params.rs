//! CSI/DCS parameter storage
//!
//! Parameters are collected incrementally while the parser scans digits,
//! `;` and `:`. Top-level values default to 0 (zero default mode) and
//! sub-parameters (colon separated, as used by SGR extended colors and
//! underline styles) default to -1.
//!
//! Storage is bounded: values beyond `max_length` and sub-parameters beyond
//! `max_sub_params_length` are silently dropped, and a single value never
//! grows past [`MAX_VALUE`].

use std::collections::BTreeMap;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Largest value a parameter can hold; further digits clamp to it
pub const MAX_VALUE: i32 = 0x7FFF_FFFF;

/// Default maximum number of top-level parameters
pub const DEFAULT_MAX_PARAMS: usize = 32;

/// Default maximum number of sub-parameters across all parameters
pub const DEFAULT_MAX_SUB_PARAMS: usize = 32;

/// A single entry of the JSON-friendly parameter representation
///
/// `"1;2:3:4;5"` becomes `[1, 2, [3, 4], 5]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Top-level parameter
    Value(i32),
    /// Sub-parameters attached to the preceding value
    Sub(Vec<i32>),
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Value(value)
    }
}

impl From<Vec<i32>> for ParamValue {
    fn from(subs: Vec<i32>) -> Self {
        ParamValue::Sub(subs)
    }
}

/// Parameter list with sub-parameter support
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Params {
    max_length: usize,
    max_sub_params_length: usize,
    values: Vec<i32>,
    sub_params: Vec<i32>,
    /// Range into `sub_params` for each entry of `values`
    sub_params_idx: Vec<Range<usize>>,
    reject_digits: bool,
    reject_sub_digits: bool,
    digit_is_sub: bool,
}

impl Default for Params {
    fn default() -> Self {
        Self::with_limits(DEFAULT_MAX_PARAMS, DEFAULT_MAX_SUB_PARAMS)
    }
}

impl Params {
    /// Create an empty parameter list with the default limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty parameter list with custom limits
    pub fn with_limits(max_length: usize, max_sub_params_length: usize) -> Self {
        Self {
            max_length,
            max_sub_params_length,
            values: Vec::with_capacity(max_length),
            sub_params: Vec::with_capacity(max_sub_params_length),
            sub_params_idx: Vec::with_capacity(max_length),
            reject_digits: false,
            reject_sub_digits: false,
            digit_is_sub: false,
        }
    }

    /// Build a parameter list from its array representation
    ///
    /// A leading sub-parameter group has nothing to attach to and is
    /// skipped; empty groups vanish.
    pub fn from_array(values: &[ParamValue]) -> Result<Self> {
        let mut params = Self::new();
        let skip = matches!(values.first(), Some(ParamValue::Sub(_))) as usize;
        for value in &values[skip..] {
            match value {
                ParamValue::Value(v) => params.add_param(*v)?,
                ParamValue::Sub(subs) => {
                    for sub in subs {
                        params.add_sub_param(*sub)?;
                    }
                }
            }
        }
        Ok(params)
    }

    /// Array representation, sub-parameters as nested groups
    pub fn to_array(&self) -> Vec<ParamValue> {
        let mut out = Vec::with_capacity(self.values.len());
        for (idx, value) in self.values.iter().enumerate() {
            out.push(ParamValue::Value(*value));
            if self.has_sub_params(idx) {
                out.push(ParamValue::Sub(self.sub_params_of(idx).to_vec()));
            }
        }
        out
    }

    /// Drop all values, keeping the limits
    pub fn reset(&mut self) {
        self.values.clear();
        self.sub_params.clear();
        self.sub_params_idx.clear();
        self.reject_digits = false;
        self.reject_sub_digits = false;
        self.digit_is_sub = false;
    }

    /// Number of top-level values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no value was added yet
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Maximum number of top-level values
    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Maximum number of sub-parameters
    pub fn max_sub_params_length(&self) -> usize {
        self.max_sub_params_length
    }

    /// Top-level values
    pub fn values(&self) -> &[i32] {
        &self.values
    }

    /// Flat sub-parameter storage
    pub fn sub_params(&self) -> &[i32] {
        &self.sub_params
    }

    /// Value at `idx`, if present
    pub fn get(&self, idx: usize) -> Option<i32> {
        self.values.get(idx).copied()
    }

    /// Value at `idx`, or `default` when absent or zero
    pub fn param_or_default(&self, idx: usize, default: i32) -> i32 {
        match self.get(idx) {
            Some(v) if v > 0 => v,
            _ => default,
        }
    }

    /// Append a new top-level value
    ///
    /// Silently ignored once `max_length` values are stored; digits that
    /// follow are rejected as well.
    pub fn add_param(&mut self, value: i32) -> Result<()> {
        self.digit_is_sub = false;
        if self.values.len() >= self.max_length {
            self.reject_digits = true;
            return Ok(());
        }
        if value < -1 {
            return Err(Error::InvalidParamValue(value));
        }
        self.push_param(value);
        Ok(())
    }

    /// Append a sub-parameter to the most recent value
    ///
    /// Ignored when there is no value yet, or when sub-parameter storage is
    /// full.
    pub fn add_sub_param(&mut self, value: i32) -> Result<()> {
        self.digit_is_sub = true;
        if self.values.is_empty() {
            return Ok(());
        }
        if self.reject_digits || self.sub_params.len() >= self.max_sub_params_length {
            self.reject_sub_digits = true;
            return Ok(());
        }
        if value < -1 {
            return Err(Error::InvalidParamValue(value));
        }
        self.push_sub_param(value);
        Ok(())
    }

    /// Append a decimal digit to the current value or sub-value
    ///
    /// A default sub-parameter (-1) is replaced by the digit. Results clamp
    /// at [`MAX_VALUE`].
    pub fn add_digit(&mut self, digit: u32) {
        let is_sub = self.digit_is_sub;
        if self.reject_digits || (is_sub && self.reject_sub_digits) {
            return;
        }
        let store = if is_sub { &mut self.sub_params } else { &mut self.values };
        let Some(cur) = store.last_mut() else {
            return;
        };
        *cur = if *cur == -1 {
            digit as i32
        } else {
            (*cur as i64 * 10 + digit as i64).min(MAX_VALUE as i64) as i32
        };
    }

    /// Whether the value at `idx` carries sub-parameters
    pub fn has_sub_params(&self, idx: usize) -> bool {
        self.sub_params_idx
            .get(idx)
            .map(|range| !range.is_empty())
            .unwrap_or(false)
    }

    /// Sub-parameters of the value at `idx`, `None` if it has none
    pub fn get_sub_params(&self, idx: usize) -> Option<&[i32]> {
        if self.has_sub_params(idx) {
            Some(self.sub_params_of(idx))
        } else {
            None
        }
    }

    /// All sub-parameter groups keyed by the index of their value
    pub fn get_sub_params_all(&self) -> BTreeMap<usize, Vec<i32>> {
        (0..self.values.len())
            .filter(|idx| self.has_sub_params(*idx))
            .map(|idx| (idx, self.sub_params_of(idx).to_vec()))
            .collect()
    }

    /// Whether the next digit goes to a sub-parameter
    pub(crate) fn digit_is_sub(&self) -> bool {
        self.digit_is_sub
    }

    /// Unchecked `add_param` for values the parser produces itself
    pub(crate) fn push_param(&mut self, value: i32) {
        self.digit_is_sub = false;
        if self.values.len() >= self.max_length {
            self.reject_digits = true;
            return;
        }
        let at = self.sub_params.len();
        self.sub_params_idx.push(at..at);
        self.values.push(value);
    }

    /// Unchecked `add_sub_param` for values the parser produces itself
    pub(crate) fn push_sub_param(&mut self, value: i32) {
        self.digit_is_sub = true;
        if self.values.is_empty() {
            return;
        }
        if self.reject_digits || self.sub_params.len() >= self.max_sub_params_length {
            self.reject_sub_digits = true;
            return;
        }
        self.sub_params.push(value);
        if let Some(range) = self.sub_params_idx.last_mut() {
            range.end += 1;
        }
    }

    fn sub_params_of(&self, idx: usize) -> &[i32] {
        &self.sub_params[self.sub_params_idx[idx].clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed a parameter string the way the escape parser does
    fn parse(params: &mut Params, s: &str) {
        params.reset();
        params.push_param(0);
        for b in s.bytes() {
            match b {
                b';' => params.push_param(0),
                b':' => params.push_sub_param(-1),
                b'0'..=b'9' => params.add_digit((b - b'0') as u32),
                _ => panic!("unexpected byte {b}"),
            }
        }
    }

    fn arr(values: Vec<ParamValue>) -> String {
        serde_json::to_string(&values).unwrap()
    }

    #[test]
    fn test_zero_default_mode() {
        let mut params = Params::new();
        parse(&mut params, "");
        assert_eq!(params.values(), &[0]);
        parse(&mut params, ";");
        assert_eq!(params.values(), &[0, 0]);
    }

    #[test]
    fn test_simple_values() {
        let mut params = Params::new();
        parse(&mut params, "1;2;3");
        assert_eq!(params.len(), 3);
        assert_eq!(params.values(), &[1, 2, 3]);
        assert_eq!(params.param_or_default(0, 5), 1);
        assert_eq!(params.param_or_default(7, 5), 5);
    }

    #[test]
    fn test_sub_params() {
        let mut params = Params::new();
        parse(&mut params, "1;2:3:4;5::6");
        assert_eq!(arr(params.to_array()), "[1,2,[3,4],5,[-1,6]]");
        assert!(!params.has_sub_params(0));
        assert_eq!(params.get_sub_params(1), Some(&[3, 4][..]));
        assert_eq!(params.get_sub_params(2), Some(&[-1, 6][..]));
        assert_eq!(params.get_sub_params(3), None);
    }

    #[test]
    fn test_leading_empty_sub_param() {
        let mut params = Params::new();
        parse(&mut params, "4::123:5;6;7");
        assert_eq!(arr(params.to_array()), "[4,[-1,123,5],6,7]");
    }

    #[test]
    fn test_sub_params_all() {
        let mut params = Params::new();
        parse(&mut params, "38:2:50:100:150;5;4:3");
        let all = params.get_sub_params_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[&0], vec![2, 50, 100, 150]);
        assert_eq!(all[&2], vec![3]);
    }

    #[test]
    fn test_digit_clamp() {
        let mut params = Params::new();
        parse(&mut params, "2147483647");
        assert_eq!(params.values(), &[MAX_VALUE]);
        parse(&mut params, "99999999999999999999;1");
        assert_eq!(params.values(), &[MAX_VALUE, 1]);
        parse(&mut params, "1:99999999999999999");
        assert_eq!(params.get_sub_params(0), Some(&[MAX_VALUE][..]));
    }

    #[test]
    fn test_max_length_drops_values() {
        let mut params = Params::with_limits(3, 3);
        parse(&mut params, "1;2;3;4;5");
        assert_eq!(params.values(), &[1, 2, 3]);
    }

    #[test]
    fn test_max_length_rejects_trailing_digits() {
        let mut params = Params::with_limits(2, 2);
        parse(&mut params, "11;22;33");
        assert_eq!(params.values(), &[11, 22]);
    }

    #[test]
    fn test_max_sub_params_drops_values() {
        let mut params = Params::with_limits(4, 2);
        parse(&mut params, "1:2:3:4;5:6");
        assert_eq!(arr(params.to_array()), "[1,[2,3],5]");
    }

    #[test]
    fn test_sub_param_without_value_is_ignored() {
        let mut params = Params::new();
        params.add_sub_param(5).unwrap();
        assert!(params.is_empty());
        assert!(params.sub_params().is_empty());
    }

    #[test]
    fn test_invalid_values() {
        let mut params = Params::new();
        assert!(matches!(params.add_param(-2), Err(Error::InvalidParamValue(-2))));
        params.add_param(-1).unwrap();
        assert!(params.add_sub_param(-5).is_err());
        params.add_sub_param(-1).unwrap();
        assert_eq!(arr(params.to_array()), "[-1,[-1]]");
    }

    #[test]
    fn test_from_array() {
        let input: Vec<ParamValue> = serde_json::from_str("[38,[2,50,100,150],5,[],6]").unwrap();
        let params = Params::from_array(&input).unwrap();
        assert_eq!(arr(params.to_array()), "[38,[2,50,100,150],5,6]");

        let leading: Vec<ParamValue> = serde_json::from_str("[[1,2],3]").unwrap();
        let params = Params::from_array(&leading).unwrap();
        assert_eq!(arr(params.to_array()), "[3]");
    }

    #[test]
    fn test_clone_is_independent() {
        let mut params = Params::new();
        parse(&mut params, "1:2;3");
        let copy = params.clone();
        params.reset();
        assert!(params.is_empty());
        assert_eq!(arr(copy.to_array()), "[1,[2],3]");
    }

    #[test]
    fn test_reset_clears_rejection() {
        let mut params = Params::with_limits(1, 1);
        parse(&mut params, "1;2");
        parse(&mut params, "7");
        assert_eq!(params.values(), &[7]);
    }
}
