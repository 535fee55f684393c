//! 本地算术求解 - 业务能力层
//!
//! 简单算术题不必绕道 LLM：求和 / 差 / 积 / 平均 / 百分比，
//! 以及带空格书写的纯算术表达式，都可以在本地直接算出。
//! 识别不出来时返回 `None`，由调用方交给 LLM 推理。

use regex::Regex;

/// 数字字面量的正则片段
const NUM: &str = r"(-?\d+(?:\.\d+)?)";

/// 尝试在本地求解算术题
pub fn solve(question: &str) -> Option<f64> {
    binary_op(question)
        .or_else(|| average(question))
        .or_else(|| percentage(question))
        .or_else(|| expression(question))
}

/// "sum of A and B" / "difference between A and B" / "product of A and B"
fn binary_op(question: &str) -> Option<f64> {
    let re = Regex::new(&format!(
        r"(?i)(sum|difference|product)\s+(?:of|between)\s+{NUM}\s+and\s+{NUM}"
    ))
    .ok()?;
    let cap = re.captures(question)?;
    let a: f64 = cap[2].parse().ok()?;
    let b: f64 = cap[3].parse().ok()?;
    match cap[1].to_lowercase().as_str() {
        "sum" => Some(a + b),
        "difference" => Some((a - b).abs()),
        "product" => Some(a * b),
        _ => None,
    }
}

/// "average of 80, 90 and 70"
fn average(question: &str) -> Option<f64> {
    let re = Regex::new(r"(?i)(?:average|mean)\s+of\s+((?:-?\d+(?:\.\d+)?(?:\s*,\s*|\s+and\s+|\s*))+)")
        .ok()?;
    let cap = re.captures(question)?;
    let num_re = Regex::new(r"-?\d+(?:\.\d+)?").ok()?;
    let values: Vec<f64> = num_re
        .find_iter(&cap[1])
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    if values.len() < 2 {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// "15% of 200" / "15 percent of 200"
fn percentage(question: &str) -> Option<f64> {
    let re = Regex::new(&format!(r"(?i){NUM}\s*(?:%|percent)\s+of\s+{NUM}")).ok()?;
    let cap = re.captures(question)?;
    let pct: f64 = cap[1].parse().ok()?;
    let base: f64 = cap[2].parse().ok()?;
    Some(pct / 100.0 * base)
}

/// 题目里内嵌的算术表达式，如 "What is 2 + 3 * 4?"
///
/// 运算符两侧必须有空白，避免把日期、编号（2019-01-01）当成减法。
fn expression(question: &str) -> Option<f64> {
    let re = Regex::new(
        r"\(?\s*-?\d+(?:\.\d+)?(?:\s*\))?(?:\s+[-+*/]\s+\(?\s*-?\d+(?:\.\d+)?(?:\s*\))?)+",
    )
    .ok()?;
    let candidate = re
        .find_iter(question)
        .max_by_key(|m| m.as_str().len())?
        .as_str();
    eval(candidate)
}

/// 递归下降求值：加减 → 乘除 → 括号 / 一元负号 / 数字
///
/// 除零或残留未消费的输入返回 `None`。
fn eval(input: &str) -> Option<f64> {
    let mut parser = Parser {
        input: input.as_bytes(),
        pos: 0,
    };
    let value = parser.expr()?;
    parser.skip_ws();
    if parser.pos == parser.input.len() {
        Some(value)
    } else {
        None
    }
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn skip_ws(&mut self) {
        while self.pos < self.input.len() && self.input[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.input.get(self.pos).copied()
    }

    fn expr(&mut self) -> Option<f64> {
        let mut value = self.term()?;
        while let Some(op @ (b'+' | b'-')) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == b'+' { value + rhs } else { value - rhs };
        }
        Some(value)
    }

    fn term(&mut self) -> Option<f64> {
        let mut value = self.factor()?;
        while let Some(op @ (b'*' | b'/')) = self.peek() {
            self.pos += 1;
            let rhs = self.factor()?;
            if op == b'*' {
                value *= rhs;
            } else {
                if rhs == 0.0 {
                    return None;
                }
                value /= rhs;
            }
        }
        Some(value)
    }

    fn factor(&mut self) -> Option<f64> {
        match self.peek()? {
            b'(' => {
                self.pos += 1;
                let value = self.expr()?;
                if self.peek()? != b')' {
                    return None;
                }
                self.pos += 1;
                Some(value)
            }
            b'-' => {
                self.pos += 1;
                Some(-self.factor()?)
            }
            _ => self.number(),
        }
    }

    fn number(&mut self) -> Option<f64> {
        self.skip_ws();
        let start = self.pos;
        while self.pos < self.input.len()
            && (self.input[self.pos].is_ascii_digit() || self.input[self.pos] == b'.')
        {
            self.pos += 1;
        }
        if self.pos == start {
            return None;
        }
        std::str::from_utf8(&self.input[start..self.pos])
            .ok()?
            .parse()
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_of_two_numbers() {
        assert_eq!(solve("What is the sum of 2 and 3?"), Some(5.0));
    }

    #[test]
    fn test_difference_is_absolute() {
        assert_eq!(solve("Find the difference between 3 and 10."), Some(7.0));
        assert_eq!(solve("Find the difference between 10 and 3."), Some(7.0));
    }

    #[test]
    fn test_product() {
        assert_eq!(solve("Compute the product of 4 and 2.5"), Some(10.0));
    }

    #[test]
    fn test_average_of_list() {
        assert_eq!(solve("What is the average of 80, 90 and 70?"), Some(80.0));
    }

    #[test]
    fn test_percentage() {
        assert_eq!(solve("How much is 15% of 200?"), Some(30.0));
        assert_eq!(solve("Calculate 50 percent of 30"), Some(15.0));
    }

    #[test]
    fn test_expression_respects_precedence() {
        assert_eq!(solve("What is 2 + 3 * 4?"), Some(14.0));
        assert_eq!(solve("Evaluate ( 2 + 3 ) * 4"), Some(20.0));
    }

    #[test]
    fn test_division_by_zero_is_none() {
        assert_eq!(solve("What is 10 / 0?"), None);
    }

    #[test]
    fn test_prose_question_is_none() {
        assert_eq!(
            solve("Download the data file and compute the mean of column score."),
            None
        );
    }

    #[test]
    fn test_dates_are_not_mistaken_for_subtraction() {
        assert_eq!(
            solve("How many days between 2019-01-01 and 2020-01-01?"),
            None
        );
    }
}
