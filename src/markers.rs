use crate::config::{Config, SignPlacement};
use crate::host::render;
use crate::prelude::*;
use crate::registry::ContainerRecord;
use crate::world::{Effect, WorldAccess};

/// Sides tried for a wall sign once the chest's own facing is taken.
const SIGN_SIDES: [BlockFace; 4] = [BlockFace::South, BlockFace::East, BlockFace::North, BlockFace::West];

/// Puts a sign on `chest` if there's an air cell for it. Never replaces anything.
/// Lines take `{player}` and `{date}`.
pub fn place_sign(world: &mut dyn WorldAccess, chest: &BlockPos, config: &Config, player: &str, now: Millis) -> Option<BlockPos> {
    let (wall, standing) = config.sign_blocks();
    let (pos, block, facing) = match config.sign_placement {
        SignPlacement::Above => (chest.above(), standing, None),
        SignPlacement::Front => {
            let front = world.facing(chest).unwrap_or(BlockFace::North);
            let face = core::iter::once(front)
                .chain(SIGN_SIDES)
                .find(|&face| world.block_at(&chest.relative(face)).is_air())?;
            (chest.relative(face), wall, Some(face))
        }
    };
    if !world.block_at(&pos).is_air() {
        return None;
    }
    let date = date_stamp(now);
    let vars = [("player", player), ("date", date.as_str())];
    let text: Vec<String> = config.sign_lines.iter().take(4).map(|line| render(line, &vars)).collect();
    world.set_block(&pos, block);
    if let Some(facing) = facing {
        world.set_facing(&pos, facing);
    }
    world.set_sign_text(&pos, &text);
    Some(pos)
}

/// The chest a sign at `sign` hangs on (or stands on).
pub fn sign_holder(world: &dyn WorldAccess, sign: &BlockPos) -> Option<BlockPos> {
    match world.block_at(sign) {
        block if block.is_wall_sign() => Some(sign.relative(world.facing(sign)?.opposite())),
        block if block.is_sign() => Some(sign.below()),
        _ => None,
    }
}

/// `MM/DD/YYYY` in UTC.
fn date_stamp(now: Millis) -> String {
    // days since 1970-01-01, shifted to an era starting 0000-03-01
    let z = now.div_euclid(86_400_000) + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);
    format!("{month:02}/{day:02}/{year}")
}

pub fn attached_signs(world: &dyn WorldAccess, chest: &BlockPos) -> Vec<BlockPos> {
    BlockFace::HORIZONTAL.iter()
        .map(|&face| chest.relative(face))
        .chain([chest.above()])
        .filter(|pos| sign_holder(world, pos).as_ref() == Some(chest))
        .collect()
}

/// Whole minutes left, never negative.
pub fn minutes_left(record: &ContainerRecord, now: Millis) -> Millis {
    record.remaining(now).map_or(0, |left| left.max(0) / MILLIS_PER_MINUTE)
}

pub fn marker_text(config: &Config, player: &str, record: &ContainerRecord, now: Millis) -> String {
    let minutes = minutes_left(record, now).to_string();
    let mut vars = vec![("player", player)];
    if config.show_time_remaining && record.expires() {
        vars.push(("time", minutes.as_str()));
    }
    render(&config.hologram_text, &vars)
}

/// Clears a death chest cell: its signs, its marker and the chest itself, contents included.
/// Cells that stopped being chests are left alone.
pub fn clear_cell(world: &mut dyn WorldAccess, pos: &BlockPos) {
    for sign in attached_signs(world, pos) {
        world.set_block(&sign, Block::AIR);
    }
    world.despawn_marker(pos);
    if world.block_at(pos).is_chest() {
        world.play_effect(pos, Effect::Removed);
        world.set_inventory(pos, vec![]);
        world.set_block(pos, Block::AIR);
    } else {
        log::debug!("death chest at {pos} was already gone");
    }
}
