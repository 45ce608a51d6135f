// ==========================================
// 计量计价导入 - 单元格公式求值器
// ==========================================
// 职责: 单元格文本 → Decimal 工程量
// 文法: 四则运算 + 括号 + 可选一个比较运算（结果 1/0）
// 红线: 只允许 + - * / 与数字字面量,其余一律拒绝
// 红线: 空白/无法解析 → None,与显式 0 严格区分
// ==========================================

use crate::domain::measurement::MeasurementCell;
use crate::engine::rounding::{quantize, MEASUREMENT_DP};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::debug;

// ==========================================
// 词法单元
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(Decimal),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Cmp(Comparison),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    fn apply(&self, lhs: Decimal, rhs: Decimal) -> bool {
        match self {
            Comparison::Lt => lhs < rhs,
            Comparison::Le => lhs <= rhs,
            Comparison::Gt => lhs > rhs,
            Comparison::Ge => lhs >= rhs,
        }
    }
}

// ==========================================
// FormulaEvaluator - 公式求值器
// ==========================================
#[derive(Debug, Clone)]
pub struct FormulaEvaluator {
    max_length: usize,
}

impl Default for FormulaEvaluator {
    fn default() -> Self {
        Self::new(crate::config::import_config_trait::DEFAULT_MAX_FORMULA_LENGTH)
    }
}

impl FormulaEvaluator {
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }

    /// 求值单元格文本
    ///
    /// # 返回
    /// - Some(Decimal): 算术结果量化到 0.01;比较结果为 1 或 0
    /// - None: 空白、非数值、非法字符、除零、溢出
    pub fn evaluate(&self, raw_text: &str) -> Option<Decimal> {
        if raw_text.chars().count() > self.max_length {
            debug!(length = raw_text.chars().count(), limit = self.max_length, "公式超长,按非数值处理");
            return None;
        }

        let prepared = preprocess(raw_text)?;
        let tokens = tokenize(&prepared)?;
        let mut parser = Parser { tokens, pos: 0 };

        let lhs = parser.expr()?;
        let result = match parser.peek() {
            Some(Token::Cmp(cmp)) => {
                parser.pos += 1;
                let rhs = parser.expr()?;
                if cmp.apply(lhs, rhs) {
                    Decimal::ONE
                } else {
                    Decimal::ZERO
                }
            }
            _ => quantize(lhs, MEASUREMENT_DP),
        };

        if parser.pos != parser.tokens.len() {
            return None;
        }
        Some(result)
    }

    /// 求值一行（(位置, 文本) 列表）
    ///
    /// 便捷入口: 逐格求值后按行乘积规则合成
    pub fn evaluate_row(&self, cells: &[(u32, &str)]) -> Option<Decimal> {
        let cells: Vec<MeasurementCell> = cells
            .iter()
            .map(|(position, text)| MeasurementCell {
                position: Some(*position),
                raw_text: text.to_string(),
                value: self.evaluate(text),
            })
            .collect();
        row_product(&cells)
    }
}

/// 使用默认上限求值
pub fn evaluate(raw_text: &str) -> Option<Decimal> {
    FormulaEvaluator::default().evaluate(raw_text)
}

/// 行乘积规则
///
/// # 规则
/// 1. 只取有位置索引且有数值的单元格
/// 2. 同位置求和,不同位置相乘
/// 3. 任一位置和为 0 → 显式 0（不跳过）
/// 4. 无任何数值单元格 → None（忽略,不是 0）
pub fn row_product(cells: &[MeasurementCell]) -> Option<Decimal> {
    let mut sums: BTreeMap<u32, Decimal> = BTreeMap::new();
    for cell in cells {
        if let (Some(position), Some(value)) = (cell.position, cell.value) {
            let entry = sums.entry(position).or_insert(Decimal::ZERO);
            *entry = entry.checked_add(value)?;
        }
    }

    if sums.is_empty() {
        return None;
    }
    if sums.values().any(|sum| sum.is_zero()) {
        return Some(Decimal::ZERO);
    }

    sums.values()
        .try_fold(Decimal::ONE, |acc, sum| acc.checked_mul(*sum))
}

// ==========================================
// 预处理
// ==========================================
// 小数逗号 → 点;× · x X → *;;/换行 → +;[ ] { } → ( )
fn preprocess(raw_text: &str) -> Option<String> {
    let trimmed = raw_text.trim();
    let trimmed = trimmed.strip_prefix('=').unwrap_or(trimmed);

    let segments: Vec<&str> = trimmed
        .split(|c| c == ';' || c == '\n' || c == '\r')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if segments.is_empty() {
        return None;
    }

    let joined = segments.join("+");
    let mapped: String = joined
        .chars()
        .map(|c| match c {
            ',' => '.',
            '×' | '·' | 'x' | 'X' => '*',
            '[' | '{' => '(',
            ']' | '}' => ')',
            other => other,
        })
        .collect();
    Some(mapped)
}

// ==========================================
// 词法分析
// ==========================================
fn tokenize(input: &str) -> Option<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => {
                i += 1;
            }
            '0'..='9' | '.' => {
                let start = i;
                let mut seen_dot = false;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    if chars[i] == '.' {
                        if seen_dot {
                            return None;
                        }
                        seen_dot = true;
                    }
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                if literal == "." {
                    return None;
                }
                let normalized = if literal.starts_with('.') {
                    format!("0{}", literal)
                } else {
                    literal
                };
                tokens.push(Token::Number(Decimal::from_str(&normalized).ok()?));
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '<' | '>' => {
                let with_eq = chars.get(i + 1) == Some(&'=');
                let cmp = match (c, with_eq) {
                    ('<', false) => Comparison::Lt,
                    ('<', true) => Comparison::Le,
                    ('>', false) => Comparison::Gt,
                    _ => Comparison::Ge,
                };
                tokens.push(Token::Cmp(cmp));
                i += if with_eq { 2 } else { 1 };
            }
            _ => return None,
        }
    }

    if tokens.is_empty() {
        return None;
    }
    Some(tokens)
}

// ==========================================
// 递归下降解析
// ==========================================
// expr   := term (('+'|'-') term)*
// term   := unary (('*'|'/') unary)*
// unary  := ('+'|'-') unary | primary
// primary:= number | '(' expr ')'
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expr(&mut self) -> Option<Decimal> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    value = value.checked_add(self.term()?)?;
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    value = value.checked_sub(self.term()?)?;
                }
                _ => return Some(value),
            }
        }
    }

    fn term(&mut self) -> Option<Decimal> {
        let mut value = self.unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    value = value.checked_mul(self.unary()?)?;
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    let divisor = self.unary()?;
                    if divisor.is_zero() {
                        return None;
                    }
                    value = value.checked_div(divisor)?;
                }
                _ => return Some(value),
            }
        }
    }

    fn unary(&mut self) -> Option<Decimal> {
        match self.peek() {
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            Some(Token::Minus) => {
                self.pos += 1;
                self.unary().map(|v| -v)
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Option<Decimal> {
        match self.next()? {
            Token::Number(value) => Some(value),
            Token::LParen => {
                let value = self.expr()?;
                match self.next()? {
                    Token::RParen => Some(value),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_plain_numbers() {
        assert_eq!(evaluate("5"), Some(d("5.00")));
        assert_eq!(evaluate("  2,5 "), Some(d("2.50")));
        assert_eq!(evaluate(".5"), Some(d("0.50")));
        assert_eq!(evaluate("0"), Some(Decimal::ZERO));
    }

    #[test]
    fn test_arithmetic_and_precedence() {
        assert_eq!(evaluate("2+3*4"), Some(d("14")));
        assert_eq!(evaluate("(2+3)*4"), Some(d("20")));
        assert_eq!(evaluate("10/4"), Some(d("2.50")));
        assert_eq!(evaluate("-3+5"), Some(d("2")));
        assert_eq!(evaluate("2x3"), Some(d("6")));
        assert_eq!(evaluate("2×3·2"), Some(d("12")));
        assert_eq!(evaluate("[1+1]*{2}"), Some(d("4")));
        assert_eq!(evaluate("=4*2"), Some(d("8")));
    }

    #[test]
    fn test_result_quantized_half_up() {
        assert_eq!(evaluate("1/3"), Some(d("0.33")));
        assert_eq!(evaluate("2/3"), Some(d("0.67")));
        assert_eq!(evaluate("0.125"), Some(d("0.13")));
        assert_eq!(evaluate("1/3").unwrap().scale(), 2);
    }

    #[test]
    fn test_implicit_row_sum() {
        assert_eq!(evaluate("1;2;3"), Some(d("6")));
        assert_eq!(evaluate("1\n2\r\n3\n"), Some(d("6")));
        assert_eq!(evaluate("2*3;4"), Some(d("10")));
    }

    #[test]
    fn test_comparison() {
        assert_eq!(evaluate("3>2"), Some(Decimal::ONE));
        assert_eq!(evaluate("3<2"), Some(Decimal::ZERO));
        assert_eq!(evaluate("2*2>=4"), Some(Decimal::ONE));
        assert_eq!(evaluate("1+1<=1"), Some(Decimal::ZERO));
    }

    #[test]
    fn test_blank_and_invalid_are_none() {
        assert_eq!(evaluate(""), None);
        assert_eq!(evaluate("   "), None);
        assert_eq!(evaluate(";\n"), None);
        assert_eq!(evaluate("abc"), None);
        assert_eq!(evaluate("2+"), None);
        assert_eq!(evaluate("(2+3"), None);
        assert_eq!(evaluate("1/0"), None);
        assert_eq!(evaluate("1.2.3"), None);
        assert_eq!(evaluate("2<3<4"), None);
        // 注入尝试
        assert_eq!(evaluate("__import__('os')"), None);
        assert_eq!(evaluate("2**3"), None);
    }

    #[test]
    fn test_max_length_guard() {
        let evaluator = FormulaEvaluator::new(8);
        assert_eq!(evaluator.evaluate("1+1"), Some(d("2")));
        assert_eq!(evaluator.evaluate("1+1+1+1+1"), None);
    }

    #[test]
    fn test_row_product_absence_vs_zero() {
        let evaluator = FormulaEvaluator::default();
        let empty = evaluator.evaluate_row(&[]);
        let zero = evaluator.evaluate_row(&[(1, "0")]);
        assert_eq!(empty, None);
        assert_eq!(zero, Some(Decimal::ZERO));
        assert_ne!(empty, zero);

        // 只有空白单元格 → None
        assert_eq!(evaluator.evaluate_row(&[(1, " "), (2, "n.d.")]), None);
        // 任一位置为 0 → 整行 0
        assert_eq!(evaluator.evaluate_row(&[(1, "3"), (2, "0")]), Some(Decimal::ZERO));
    }

    #[test]
    fn test_row_product_sums_same_position() {
        let evaluator = FormulaEvaluator::default();
        // 位置 1: 2+3=5,位置 2: 4 → 20
        let value = evaluator.evaluate_row(&[(1, "2"), (1, "3"), (2, "4")]);
        assert_eq!(value, Some(d("20")));
        // 同位置抵消为 0 → 显式 0
        let value = evaluator.evaluate_row(&[(1, "2"), (1, "-2"), (2, "4")]);
        assert_eq!(value, Some(Decimal::ZERO));
    }

    #[test]
    fn test_row_product_ignores_cells_without_position() {
        let cells = vec![
            MeasurementCell {
                position: None,
                raw_text: "9".to_string(),
                value: Some(d("9")),
            },
            MeasurementCell {
                position: Some(1),
                raw_text: "2".to_string(),
                value: Some(d("2")),
            },
        ];
        assert_eq!(row_product(&cells), Some(d("2")));
    }
}
