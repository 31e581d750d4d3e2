//! The economy rules table — every monetary constant in one immutable,
//! version-tagged value.
//!
//! RULE: a `Rules` value is threaded as a parameter, never held in a
//! global. Changing any constant requires a new `version` string; rows
//! produced under an old version stay valid under that version.

use serde::{Deserialize, Serialize};

use crate::error::{EconError, EconResult};
use crate::event::WinType;

const KNIFE_WEAPONS: &[&str] = &[
    "knife", "knife_t", "knife_ct", "bayonet", "knife_karambit",
    "knife_m9_bayonet", "knife_flip", "knife_gut", "knife_falchion",
    "knife_bowie", "knife_butterfly", "knife_push", "knife_cord",
    "knife_canis", "knife_ursus", "knife_gypsy_jackknife", "knife_outdoor",
    "knife_stiletto", "knife_widowmaker", "knife_css", "knife_skeleton",
];

const SMG_WEAPONS: &[&str] = &["mac10", "mp7", "mp5sd", "mp9", "bizon", "ump45"];

const SHOTGUN_WEAPONS: &[&str] = &["nova", "mag7", "sawedoff"];

const RIFLE_WEAPONS: &[&str] = &[
    "ak47", "m4a1", "m4a1_silencer", "famas", "galil", "aug", "sg556",
    "scar20", "g3sg1",
];

const PISTOL_WEAPONS: &[&str] = &[
    "glock", "usp_silencer", "p2000", "p250", "fiveseven", "tec9", "cz75a",
    "deagle", "revolver", "elite", "hkp2000",
];

const GRENADE_WEAPONS: &[&str] = &[
    "hegrenade", "flashbang", "smokegrenade", "incgrenade", "molotov", "decoy",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rules {
    // Money constraints
    pub money_cap: i64,
    pub start_money: i64,

    // Kill rewards by weapon category
    pub knife_reward: i64,
    pub smg_default_reward: i64,
    pub p90_reward: i64,
    pub shotgun_default_reward: i64,
    pub xm1014_reward: i64,
    pub rifle_reward: i64,
    pub pistol_reward: i64,
    pub grenade_reward: i64,
    pub awp_reward: i64,
    pub zeus_reward: i64,

    /// Assists are lineage-only under this ruleset. The constant exists
    /// so a future nonzero amount is a one-line change.
    pub assist_reward: i64,

    // Win rewards by condition
    pub elimination_reward: i64,
    pub t_bomb_explosion_reward: i64,
    pub ct_defuse_reward: i64,
    pub ct_time_expired_no_plant_reward: i64,

    /// Loss bonus progression, indexed by pre-increment loss streak and
    /// clamped at the last rung.
    pub loss_bonus_ladder: Vec<i64>,

    // Objective bonuses
    pub t_plant_team_bonus_on_loss: i64,
    pub actor_objective_bonus: i64,

    /// Version tag carried on every output row.
    pub version: String,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            money_cap: 16_000,
            start_money: 800,
            knife_reward: 1_500,
            smg_default_reward: 600,
            p90_reward: 300,
            shotgun_default_reward: 900,
            xm1014_reward: 600,
            rifle_reward: 300,
            pistol_reward: 300,
            grenade_reward: 300,
            awp_reward: 100,
            zeus_reward: 100,
            assist_reward: 0,
            elimination_reward: 3_250,
            t_bomb_explosion_reward: 3_500,
            ct_defuse_reward: 3_500,
            ct_time_expired_no_plant_reward: 3_250,
            loss_bonus_ladder: vec![1_400, 1_900, 2_400, 2_900, 3_400],
            t_plant_team_bonus_on_loss: 800,
            actor_objective_bonus: 300,
            version: "2025_09".to_string(),
        }
    }
}

impl Rules {
    /// Kill reward for a weapon identifier.
    ///
    /// An unmapped weapon is a rules-table gap, not a recoverable case:
    /// it fails with a configuration error instead of a silent default.
    pub fn kill_reward_for(&self, weapon: &str) -> EconResult<i64> {
        if weapon.is_empty() {
            return Err(EconError::Configuration(
                "kill event carries no weapon".to_string(),
            ));
        }

        let w = weapon.to_ascii_lowercase();

        // Special cases before category lookups.
        let reward = match w.as_str() {
            "p90" => self.p90_reward,
            "xm1014" => self.xm1014_reward,
            "awp" => self.awp_reward,
            "zeus" | "taser" => self.zeus_reward,
            _ if KNIFE_WEAPONS.contains(&w.as_str()) => self.knife_reward,
            _ if SMG_WEAPONS.contains(&w.as_str()) => self.smg_default_reward,
            _ if SHOTGUN_WEAPONS.contains(&w.as_str()) => self.shotgun_default_reward,
            _ if RIFLE_WEAPONS.contains(&w.as_str()) => self.rifle_reward,
            _ if PISTOL_WEAPONS.contains(&w.as_str()) => self.pistol_reward,
            _ if GRENADE_WEAPONS.contains(&w.as_str()) => self.grenade_reward,
            _ => {
                return Err(EconError::Configuration(format!(
                    "no kill reward mapped for weapon '{weapon}' (rules {})",
                    self.version
                )))
            }
        };
        Ok(reward)
    }

    pub fn win_reward_for(&self, win_type: WinType) -> i64 {
        match win_type {
            WinType::Elimination => self.elimination_reward,
            WinType::TBombExplosion => self.t_bomb_explosion_reward,
            WinType::CtDefuse => self.ct_defuse_reward,
            WinType::CtTimeExpiredNoPlant => self.ct_time_expired_no_plant_reward,
        }
    }

    /// Loss bonus for a team that enters round end with `streak`
    /// consecutive losses already on the board.
    pub fn loss_bonus_for(&self, streak: u32) -> i64 {
        let idx = (streak as usize).min(self.loss_bonus_ladder.len() - 1);
        self.loss_bonus_ladder[idx]
    }

    pub fn clamp_money(&self, amount: i64) -> i64 {
        amount.clamp(0, self.money_cap)
    }
}
