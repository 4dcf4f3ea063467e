//! Text commands typed by the player, turned into requests for the server

use crate::mirror::MirrorWorld;
use shared::{CosmeticCatalog, CosmeticSlot, EntityId, Request, Vec3, NONE_INDEX};
use thiserror::Error;

pub const HELP: &str = "\
commands:
  name <name>              announce yourself to the lobby
  ready                    toggle ready
  start                    start the game (coordinator only)
  next <slot> | prev <slot>  cycle a cosmetic slot
  <slot> <index|none>      pick a cosmetic index directly
  move <x> <y> <z>         move your avatar
  fire <x> <z>             shoot along the ground (or fire <x> <y> <z>)
  hurt <amount>            damage your own avatar
  claim <pickup id>        claim a pickup you are touching
  status                   show the mirrored session
  leave                    leave the session and quit
slots: body bodypart eyes glove headpart mouth tail";

#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("unknown command '{0}', type 'help'")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("unknown cosmetic slot '{0}'")]
    Slot(String),
    #[error("'{0}' is not a number")]
    Number(String),
    #[error("no avatar yet, announce first")]
    NoAvatar,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Status,
    Send(Request),
    /// Resolved against the mirrored selection when sent
    Cycle { slot: CosmeticSlot, forward: bool },
    /// Damage aimed at the local avatar
    Hurt { amount: i32 },
}

impl Command {
    pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let command = match verb.to_ascii_lowercase().as_str() {
            "help" | "?" => Command::Help,
            "status" => Command::Status,
            "name" | "announce" => {
                if args.is_empty() {
                    return Err(CommandError::Usage("name <name>"));
                }
                Command::Send(Request::Announce { name: args.join(" ") })
            }
            "ready" => Command::Send(Request::ToggleReady),
            "start" => Command::Send(Request::StartGame),
            "next" | "prev" => {
                let [slot] = args[..] else {
                    return Err(CommandError::Usage("next <slot> | prev <slot>"));
                };
                Command::Cycle {
                    slot: parse_slot(slot)?,
                    forward: verb.eq_ignore_ascii_case("next"),
                }
            }
            "cosmetic" => {
                let [slot, index] = args[..] else {
                    return Err(CommandError::Usage("cosmetic <slot> <index>"));
                };
                Command::Send(Request::ChangeCosmetic {
                    slot: parse_slot(slot)?,
                    index: parse_index(index)?,
                })
            }
            "move" => Command::Send(Request::Move {
                position: parse_vec3(&args, "move <x> <y> <z>")?,
            }),
            "fire" => {
                let direction = match args[..] {
                    [x, z] => Vec3::new(parse_number(x)?, 0.0, parse_number(z)?),
                    _ => parse_vec3(&args, "fire <x> <z> | fire <x> <y> <z>")?,
                };
                Command::Send(Request::Fire { direction })
            }
            "hurt" => {
                let [amount] = args[..] else {
                    return Err(CommandError::Usage("hurt <amount>"));
                };
                Command::Hurt {
                    amount: parse_number(amount)?,
                }
            }
            "claim" => {
                let [pickup] = args[..] else {
                    return Err(CommandError::Usage("claim <pickup id>"));
                };
                Command::Send(Request::ClaimBuff {
                    pickup: parse_number::<EntityId>(pickup)?,
                })
            }
            "leave" | "quit" | "exit" => Command::Send(Request::Leave),
            other => match other.parse::<CosmeticSlot>() {
                Ok(slot) => {
                    let [index] = args[..] else {
                        return Err(CommandError::Usage("<slot> <index|none>"));
                    };
                    Command::Send(Request::ChangeCosmetic {
                        slot,
                        index: parse_index(index)?,
                    })
                }
                Err(_) => return Err(CommandError::Unknown(other.to_string())),
            },
        };
        Ok(Some(command))
    }

    /// Builds the request to send, if this command sends one
    pub fn to_request(&self, world: &MirrorWorld, catalog: &CosmeticCatalog) -> Result<Option<Request>, CommandError> {
        match self {
            Command::Help | Command::Status => Ok(None),
            Command::Send(request) => Ok(Some(request.clone())),
            Command::Cycle { slot, forward } => {
                let avatar = world
                    .local_avatar()
                    .and_then(|e| e.avatar.as_ref())
                    .ok_or(CommandError::NoAvatar)?;
                let current = avatar.cosmetics.get(*slot);
                let index = if *forward {
                    catalog.next_index(*slot, current)
                } else {
                    catalog.prev_index(*slot, current)
                };
                Ok(Some(Request::ChangeCosmetic { slot: *slot, index }))
            }
            Command::Hurt { amount } => {
                let target = world.local_avatar().ok_or(CommandError::NoAvatar)?.id;
                Ok(Some(Request::Damage {
                    target,
                    amount: *amount,
                }))
            }
        }
    }
}

fn parse_slot(word: &str) -> Result<CosmeticSlot, CommandError> {
    word.parse().map_err(|_| CommandError::Slot(word.to_string()))
}

fn parse_number<T: std::str::FromStr>(word: &str) -> Result<T, CommandError> {
    word.parse().map_err(|_| CommandError::Number(word.to_string()))
}

fn parse_index(word: &str) -> Result<i32, CommandError> {
    if word.eq_ignore_ascii_case("none") {
        Ok(NONE_INDEX)
    } else {
        parse_number(word)
    }
}

fn parse_vec3(args: &[&str], usage: &'static str) -> Result<Vec3, CommandError> {
    let [x, y, z] = args[..] else {
        return Err(CommandError::Usage(usage));
    };
    Ok(Vec3::new(parse_number(x)?, parse_number(y)?, parse_number(z)?))
}

/// One-paragraph summary of the mirrored session for the `status` command
pub fn describe(world: &MirrorWorld) -> String {
    let mut lines = vec![format!(
        "phase {:?}, tick {}, client {:?}",
        world.phase(),
        world.last_tick(),
        world.client_id()
    )];
    for participant in world.roster() {
        lines.push(format!(
            "  {} {}{}",
            participant.id,
            participant.name,
            if participant.ready { " (ready)" } else { "" }
        ));
    }
    if let Some(avatar) = world.local_avatar() {
        let attack = avatar.avatar.as_ref().map(|a| *a.attack.get()).unwrap_or_default();
        lines.push(format!(
            "  you: entity {} at {:?}, health {}/{}, attack {}",
            avatar.id,
            avatar.position.get(),
            avatar.health.get(),
            avatar.max_health,
            attack
        ));
    }
    for entity in world.entities().filter(|e| Some(e.id) != world.local_avatar().map(|a| a.id)) {
        lines.push(format!(
            "  {:?} {} at {:?}, health {}",
            entity.kind,
            entity.id,
            entity.position.get(),
            entity.health.get()
        ));
    }
    if world.can_start() {
        lines.push("  everyone is ready: type 'start'".to_string());
    }
    lines.join("\n")
}
