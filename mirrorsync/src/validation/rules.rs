use crate::bail;
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::sync_error;
use crate::validation::eval::evaluate;
use crate::validation::expr::{Expr, parse};
use crate::validation::value::{Value, Variables};

/// What happens to an extraction when a rule does not hold for a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureAction {
    /// Keep the row and report the failure.
    #[default]
    Continue,
    /// Drop the row.
    SkipRow,
    /// Abort the whole extraction without producing output.
    SkipAll,
}

impl FailureAction {
    /// Maps the catalog's numeric action code. Unknown codes fall back to
    /// [`FailureAction::Continue`].
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => FailureAction::SkipRow,
            2 => FailureAction::SkipAll,
            _ => FailureAction::Continue,
        }
    }
}

/// A boolean rule over the columns of one row.
#[derive(Debug, Clone)]
pub struct ValidationRule {
    expression: String,
    compiled: Expr,
    action: FailureAction,
}

impl ValidationRule {
    /// Compiles `expression`, failing with [`ErrorKind::InvalidExpression`] when it does not
    /// parse.
    pub fn new(expression: impl Into<String>, action: FailureAction) -> SyncResult<Self> {
        let expression = expression.into();
        let compiled = parse(&expression)?;

        Ok(Self {
            expression,
            compiled,
            action,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn action(&self) -> FailureAction {
        self.action
    }

    /// Returns `Ok(true)` when the rule holds for `variables`.
    pub fn check(&self, variables: &Variables) -> SyncResult<bool> {
        match evaluate(&self.compiled, variables)? {
            Value::Bool(holds) => Ok(holds),
            other => bail!(
                ErrorKind::ExpressionEvaluationFailed,
                "Rule did not evaluate to a boolean",
                format!("`{}` produced {}", self.expression, other.type_name())
            ),
        }
    }
}

/// Outcome of running a [`RuleSet`] over one row.
#[derive(Debug)]
pub enum RowVerdict {
    /// The row is emitted. `warning` carries the last failure of a `Continue` rule.
    Keep { warning: Option<SyncError> },
    /// The row is dropped.
    SkipRow(SyncError),
    /// The extraction must stop.
    Abort(SyncError),
}

/// Ordered rules of a dataset.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<ValidationRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<ValidationRule>) -> Self {
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn rules(&self) -> &[ValidationRule] {
        &self.rules
    }

    /// Runs every rule in declaration order.
    ///
    /// A rule fails when it evaluates to `false` or cannot be evaluated. The first failing
    /// `SkipAll` or `SkipRow` rule decides the verdict; failing `Continue` rules only replace the
    /// remembered warning.
    pub fn evaluate(&self, variables: &Variables) -> RowVerdict {
        let mut warning = None;

        for rule in &self.rules {
            let failure = match rule.check(variables) {
                Ok(true) => continue,
                Ok(false) => sync_error!(
                    ErrorKind::ValidationRowSkip,
                    "Row failed validation rule",
                    rule.expression()
                ),
                Err(err) => err,
            };

            match rule.action {
                FailureAction::SkipAll => {
                    let abort = sync_error!(
                        ErrorKind::ValidationAbort,
                        "Validation rule aborted the extraction",
                        rule.expression()
                    )
                    .with_source(failure);
                    return RowVerdict::Abort(abort);
                }
                FailureAction::SkipRow => {
                    let skip = sync_error!(
                        ErrorKind::ValidationRowSkip,
                        "Row skipped by validation rule",
                        rule.expression()
                    )
                    .with_source(failure);
                    return RowVerdict::SkipRow(skip);
                }
                FailureAction::Continue => warning = Some(failure),
            }
        }

        RowVerdict::Keep { warning }
    }
}

impl FromIterator<ValidationRule> for RuleSet {
    fn from_iter<T: IntoIterator<Item = ValidationRule>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(bindings: &[(&str, Value)]) -> Variables {
        bindings
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    fn rules(rules: &[(&str, FailureAction)]) -> RuleSet {
        rules
            .iter()
            .map(|(expr, action)| ValidationRule::new(*expr, *action).unwrap())
            .collect()
    }

    #[test]
    fn unparsable_rule_is_rejected_up_front() {
        let err = ValidationRule::new("a >", FailureAction::SkipRow).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidExpression);
    }

    #[test]
    fn passing_rules_keep_the_row() {
        let set = rules(&[("a > 0", FailureAction::SkipAll)]);
        assert!(matches!(
            set.evaluate(&row(&[("a", Value::Int(3))])),
            RowVerdict::Keep { warning: None }
        ));
    }

    #[test]
    fn skip_all_aborts() {
        let set = rules(&[
            ("a > 0", FailureAction::Continue),
            ("a != 'NULL' && a > 0", FailureAction::SkipAll),
        ]);
        let RowVerdict::Abort(err) = set.evaluate(&row(&[("a", Value::Int(-11))])) else {
            panic!("expected abort");
        };
        assert_eq!(err.kind(), ErrorKind::ValidationAbort);
    }

    #[test]
    fn skip_row_drops_only_the_row() {
        let set = rules(&[("b == 'x'", FailureAction::SkipRow)]);
        let verdict = set.evaluate(&row(&[("b", Value::Str("y".to_string()))]));
        assert!(matches!(verdict, RowVerdict::SkipRow(ref e) if e.kind() == ErrorKind::ValidationRowSkip));
    }

    #[test]
    fn continue_keeps_the_last_warning() {
        let set = rules(&[
            ("a > 10", FailureAction::Continue),
            ("missing > 1", FailureAction::Continue),
        ]);
        let RowVerdict::Keep { warning: Some(err) } = set.evaluate(&row(&[("a", Value::Int(1))]))
        else {
            panic!("expected kept row with warning");
        };
        assert_eq!(err.kind(), ErrorKind::ExpressionEvaluationFailed);
    }

    #[test]
    fn non_boolean_result_is_a_failure() {
        let set = rules(&[("a + 1", FailureAction::SkipRow)]);
        assert!(matches!(
            set.evaluate(&row(&[("a", Value::Int(1))])),
            RowVerdict::SkipRow(_)
        ));
    }

    #[test]
    fn action_codes() {
        assert_eq!(FailureAction::from_code(0), FailureAction::Continue);
        assert_eq!(FailureAction::from_code(1), FailureAction::SkipRow);
        assert_eq!(FailureAction::from_code(2), FailureAction::SkipAll);
        assert_eq!(FailureAction::from_code(7), FailureAction::Continue);
    }
}
