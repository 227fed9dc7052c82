pub mod dispatcher;
pub mod mute;
pub mod pipeline;
pub mod presence;
pub mod routing;
pub mod tokens;

/// Username comparison policy. The canonical form of a server username is
/// whatever the presence source guarantees; this is a configuration point,
/// not something the engine decides on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Casing {
    #[default]
    Sensitive,
    Insensitive,
}

impl Casing {
    pub fn canon(&self, username: &str) -> String {
        match self {
            Casing::Sensitive => username.to_string(),
            Casing::Insensitive => username.to_lowercase(),
        }
    }
}
