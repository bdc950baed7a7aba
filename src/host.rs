use crate::prelude::*;
use std::collections::{HashMap, HashSet};

pub const PERMISSION_CHEST: &str = "deathchest.chest";
pub const PERMISSION_ADMIN: &str = "deathchest.admin";

/// What the core needs to know about players. Implemented by the host server.
pub trait Players {
    fn has_permission(&self, player: PlayerId, permission: &str) -> bool;
    fn is_online(&self, player: PlayerId) -> bool;
    fn send_message(&mut self, player: PlayerId, text: &str);
    fn name_of(&self, player: PlayerId) -> Option<String>;
}

/// In-memory `Players`, recording every message sent.
#[derive(Debug, Default)]
pub struct Roster {
    names: HashMap<PlayerId, String>,
    online: HashSet<PlayerId>,
    permissions: HashSet<(PlayerId, String)>,
    pub outbox: Vec<(PlayerId, String)>,
}
impl Roster {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn join(&mut self, player: PlayerId, name: &str) {
        self.names.insert(player, name.to_owned());
        self.online.insert(player);
    }
    pub fn leave(&mut self, player: PlayerId) {
        self.online.remove(&player);
    }
    pub fn grant(&mut self, player: PlayerId, permission: &str) {
        self.permissions.insert((player, permission.to_owned()));
    }
    pub fn messages_for(&self, player: PlayerId) -> impl Iterator<Item = &str> {
        self.outbox.iter().filter(move |(p, _)| *p == player).map(|(_, m)| m.as_str())
    }
}
impl Players for Roster {
    fn has_permission(&self, player: PlayerId, permission: &str) -> bool {
        self.permissions.contains(&(player, permission.to_owned()))
    }
    fn is_online(&self, player: PlayerId) -> bool {
        self.online.contains(&player)
    }
    fn send_message(&mut self, player: PlayerId, text: &str) {
        log::trace!("-> {player}: {text}");
        self.outbox.push((player, text.to_owned()));
    }
    fn name_of(&self, player: PlayerId) -> Option<String> {
        self.names.get(&player).cloned()
    }
}

/// Fills `{key}` placeholders and turns `&c`-style colour codes into section signs.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut text = template.to_owned();
    for (key, value) in vars {
        text = text.replace(&format!("{{{key}}}"), value);
    }
    translate_colours(&text)
}

fn translate_colours(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match chars.peek() {
            Some(&code) if c == '&' && "0123456789abcdefklmnorABCDEFKLMNOR".contains(code) => {
                out.push('\u{a7}');
                out.push(code.to_ascii_lowercase());
                chars.next();
            }
            _ => out.push(c),
        }
    }
    out
}

/// The placeholders every chest message understands.
pub fn location_vars(pos: &BlockPos) -> [(&'static str, String); 4] {
    [
        ("location", pos.to_string()),
        ("x", pos.pos.x.to_string()),
        ("y", pos.pos.y.to_string()),
        ("z", pos.pos.z.to_string()),
    ]
}

pub(crate) fn send(players: &mut dyn Players, to: PlayerId, template: &str, pos: Option<&BlockPos>, extra: &[(&str, String)]) {
    if template.is_empty() {
        return;
    }
    let location = pos.map(location_vars);
    let vars: Vec<(&str, &str)> = location.iter().flatten()
        .chain(extra)
        .map(|(k, v)| (*k, v.as_str()))
        .collect();
    players.send_message(to, &render(template, &vars));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_and_colours() {
        let pos = BlockPos::new("world", 1, -2, 3);
        let vars = location_vars(&pos);
        let vars: Vec<_> = vars.iter().map(|(k, v)| (*k, v.as_str())).collect();
        assert_eq!(
            render("&eChest at &f{location} ({x}/{y}/{z})", &vars),
            "\u{a7}eChest at \u{a7}fx:1, y:-2, z:3 in world (1/-2/3)"
        );
    }

    #[test]
    fn ampersands_that_arent_codes_survive() {
        assert_eq!(render("salt & pepper &", &[]), "salt & pepper &");
        assert_eq!(render("{time} left", &[("time", "4")]), "4 left");
    }

    #[test]
    fn empty_templates_send_nothing() {
        let mut roster = Roster::new();
        let id = PlayerId::from_u128(7);
        send(&mut roster, id, "", None, &[]);
        assert!(roster.outbox.is_empty());
        send(&mut roster, id, "{amount} xp", None, &[("amount", "12".into())]);
        assert_eq!(roster.messages_for(id).collect::<Vec<_>>(), ["12 xp"]);
    }
}
