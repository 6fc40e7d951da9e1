use regex::Regex;
use std::collections::HashMap;

/// Context for variable interpolation.
#[derive(Debug, Clone, Default)]
pub struct InterpolationContext {
    /// Pipeline and job variables
    pub variables: HashMap<String, String>,
    /// Matrix values for the current instance
    pub matrix: HashMap<String, String>,
    /// Secrets to mask in output
    pub secrets: HashMap<String, String>,
}

impl InterpolationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interpolate variables in a string.
    ///
    /// Supports:
    /// - `${{ variable }}` - direct variable lookup
    /// - `${{ env.VAR }}` - environment variable
    /// - `${{ matrix.key }}` - matrix value
    pub fn interpolate(&self, input: &str) -> String {
        let re = Regex::new(r"\$\{\{\s*([^}]+)\s*\}\}").unwrap();

        re.replace_all(input, |caps: &regex::Captures| {
            let expr = caps.get(1).map_or("", |m| m.as_str()).trim();
            self.resolve_expression(expr)
        })
        .to_string()
    }

    fn resolve_expression(&self, expr: &str) -> String {
        if let Some(var_name) = expr.strip_prefix("env.") {
            return self
                .variables
                .get(var_name)
                .cloned()
                .or_else(|| std::env::var(var_name).ok())
                .unwrap_or_default();
        }

        if let Some(key) = expr.strip_prefix("matrix.") {
            return self.matrix.get(key).cloned().unwrap_or_default();
        }

        self.variables.get(expr).cloned().unwrap_or_default()
    }

    /// Mask secrets in the input string.
    pub fn mask_secrets(&self, input: &str) -> String {
        let mut output = input.to_string();
        for value in self.secrets.values() {
            if !value.is_empty() {
                output = output.replace(value, "***");
            }
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolate_simple_variable() {
        let mut ctx = InterpolationContext::new();
        ctx.variables
            .insert("NAME".to_string(), "world".to_string());

        assert_eq!(ctx.interpolate("Hello ${{ NAME }}!"), "Hello world!");
    }

    #[test]
    fn test_interpolate_matrix_variable() {
        let mut ctx = InterpolationContext::new();
        ctx.matrix.insert("target".to_string(), "aarch64".to_string());

        assert_eq!(
            ctx.interpolate("wheel-${{ matrix.target }}"),
            "wheel-aarch64"
        );
    }

    #[test]
    fn test_interpolate_missing_variable_returns_empty() {
        let ctx = InterpolationContext::new();

        assert_eq!(ctx.interpolate("Value: ${{ MISSING }}"), "Value: ");
        assert_eq!(ctx.interpolate("${{ matrix.missing }}"), "");
    }

    #[test]
    fn test_interpolate_whitespace_variations() {
        let mut ctx = InterpolationContext::new();
        ctx.variables.insert("VAR".to_string(), "value".to_string());

        assert_eq!(ctx.interpolate("${{VAR}}"), "value");
        assert_eq!(ctx.interpolate("${{ VAR }}"), "value");
        assert_eq!(ctx.interpolate("${{  VAR  }}"), "value");
    }

    #[test]
    fn test_mask_secrets() {
        let mut ctx = InterpolationContext::new();
        ctx.secrets
            .insert("TOKEN".to_string(), "hunter2".to_string());

        assert_eq!(
            ctx.mask_secrets("uploading with token hunter2"),
            "uploading with token ***"
        );
    }
}
