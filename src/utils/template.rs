//! `@token` substitution for configuration strings.

/// Values for the tokens that may appear in path-like settings.
#[derive(Debug, Clone, Default)]
pub struct Tokens {
    pub project_name: String,
    pub branch: String,
    pub env: String,
}

impl Tokens {
    pub const PROJECT_NAME: &'static str = "@project-name";
    pub const BRANCH: &'static str = "@branch";
    pub const ENV: &'static str = "@env";

    pub fn render(&self, template: &str) -> String {
        template
            .replace(Self::PROJECT_NAME, &self.project_name)
            .replace(Self::BRANCH, &self.branch)
            .replace(Self::ENV, &self.env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_replaces_all_tokens() {
        let tokens = Tokens {
            project_name: "acme".to_string(),
            branch: "feature-x".to_string(),
            env: "staging".to_string(),
        };
        assert_eq!(
            tokens.render("/home/@project-name/@env/@branch"),
            "/home/acme/staging/feature-x"
        );
    }

    #[test]
    fn render_leaves_plain_strings_alone() {
        assert_eq!(Tokens::default().render("drupal_extra"), "drupal_extra");
    }
}
