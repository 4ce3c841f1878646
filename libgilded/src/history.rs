use crate::actor::{ActorId, Holder};
use crate::amount::Copper;
use crate::calendar::Calendar;
use crate::error::Anomaly;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One balance reading: the absolute balance at a timestamp in minutes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Observation {
    pub minute: i64,
    pub balance: Copper,
}

/// Turns an encoded history string into observations in source order.
/// Reconstruction does not depend on the encoding.
pub trait HistoryDecoder {
    fn decode(&self, raw: &str) -> Vec<Observation>;
}

/// `minute,copper` CSV as written by TradeSkillMaster's gold logs.
#[derive(Clone, Copy, Debug, Default)]
pub struct MinuteCopperLog;

impl MinuteCopperLog {
    pub const HEADER: &'static str = "minute,copper";
}

impl HistoryDecoder for MinuteCopperLog {
    fn decode(&self, raw: &str) -> Vec<Observation> {
        let mut lines = raw.trim().lines();
        if lines.next().map(str::trim) != Some(Self::HEADER) {
            return Vec::new();
        }

        lines
            .filter_map(|line| {
                let (minute, copper) = line.trim().split_once(',')?;
                Some(Observation {
                    minute: minute.trim().parse().ok()?,
                    balance: Copper(copper.trim().parse().ok()?),
                })
            })
            .collect()
    }
}

/// Day-resolution balance history of one holder.
#[derive(Clone, Debug, PartialEq)]
pub struct HolderHistory {
    pub holder: Holder,
    /// last reading of each day, with the minute it was taken
    days: BTreeMap<NaiveDate, (i64, Copper)>,
    /// the holder is left out from this day on
    excluded_from: Option<NaiveDate>,
}

impl HolderHistory {
    /// Fold observations into per-day readings. A timestamp that goes back
    /// in time makes the rest of the sequence untrustworthy: readings from
    /// that day on are dropped and an anomaly is returned.
    pub fn from_observations(
        holder: Holder,
        observations: &[Observation],
        calendar: Calendar,
    ) -> (HolderHistory, Option<Anomaly>) {
        let mut history = HolderHistory {
            holder,
            days: BTreeMap::new(),
            excluded_from: None,
        };
        let mut anomaly = None;
        let mut previous: Option<i64> = None;

        for obs in observations {
            let Some(day) = calendar.day_of(obs.minute.saturating_mul(60)) else {
                continue;
            };

            if let Some(prev) = previous.filter(|&prev| obs.minute < prev) {
                history.days.retain(|&d, _| d < day);
                history.excluded_from = Some(day);
                anomaly = Some(Anomaly::InconsistentHistory {
                    actor: history.holder.to_string(),
                    minute: obs.minute,
                    previous: prev,
                    excluded_from: day,
                });
                break;
            }

            history.days.insert(day, (obs.minute, obs.balance));
            previous = Some(obs.minute);
        }

        (history, anomaly)
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        self.days.keys().next().copied()
    }

    pub fn last_day(&self) -> Option<NaiveDate> {
        self.days.keys().next_back().copied()
    }

    /// Balance carried forward from the latest reading on or before `day`.
    pub fn balance_on(&self, day: NaiveDate) -> Option<Copper> {
        if self.excluded_from.is_some_and(|from| from <= day) {
            return None;
        }
        self.days
            .range(..=day)
            .next_back()
            .map(|(_, &(_, balance))| balance)
    }

    /// Combine two histories of the same holder, e.g. a character logged
    /// under two owner labels. The later reading of a day wins.
    pub fn merge(&mut self, other: HolderHistory) {
        for (day, (minute, balance)) in other.days {
            match self.days.get(&day) {
                Some(&(existing, _)) if existing > minute => {}
                _ => {
                    self.days.insert(day, (minute, balance));
                }
            }
        }
        self.excluded_from = match (self.excluded_from, other.excluded_from) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
    }
}

/// Balances of every tracked holder for one calendar day.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DailySnapshot {
    pub date: NaiveDate,
    pub characters: BTreeMap<ActorId, Copper>,
    pub warbank: Option<Copper>,
}

impl DailySnapshot {
    /// Sum of character balances. The warbank is tracked on its own.
    pub fn total(&self) -> Copper {
        self.characters.values().copied().sum()
    }

    pub fn externalize(&self) -> GoldDay {
        GoldDay {
            date: self.date,
            characters: self
                .characters
                .iter()
                .map(|(actor, copper)| (actor.to_string(), copper.whole_gold()))
                .collect(),
            bank: self.warbank.unwrap_or_default().whole_gold(),
            total: self.total().whole_gold(),
        }
    }
}

/// On-disk shape of a daily gold file. All figures are whole gold.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GoldDay {
    pub date: NaiveDate,
    pub characters: BTreeMap<String, i64>,
    pub bank: i64,
    pub total: i64,
}

/// Collapse histories that belong to the same holder.
pub fn merge_holders(histories: Vec<HolderHistory>) -> Vec<HolderHistory> {
    let mut by_holder: BTreeMap<Holder, HolderHistory> = BTreeMap::new();
    for history in histories {
        match by_holder.get_mut(&history.holder) {
            Some(existing) => existing.merge(history),
            None => {
                by_holder.insert(history.holder.clone(), history);
            }
        }
    }
    by_holder.into_values().collect()
}

/// Dense reconstruction: one snapshot for every day from the first reading
/// of any holder to the last one (or `through`, when later).
pub fn reconstruct(
    histories: &[HolderHistory],
    through: Option<NaiveDate>,
) -> BTreeMap<NaiveDate, DailySnapshot> {
    let mut snapshots = BTreeMap::new();

    let Some(first) = histories.iter().filter_map(HolderHistory::first_day).min() else {
        return snapshots;
    };
    let last = histories
        .iter()
        .filter_map(HolderHistory::last_day)
        .chain(through)
        .max()
        .unwrap_or(first);

    for day in first.iter_days().take_while(|d| *d <= last) {
        let mut snapshot = DailySnapshot {
            date: day,
            ..Default::default()
        };

        for history in histories {
            let Some(balance) = history.balance_on(day) else {
                continue;
            };
            match &history.holder {
                Holder::Character(actor) => {
                    snapshot.characters.insert(actor.clone(), balance);
                }
                Holder::Warbank => snapshot.warbank = Some(balance),
            }
        }

        snapshots.insert(day, snapshot);
    }

    tracing::debug!(
        days = snapshots.len(),
        holders = histories.len(),
        "reconstructed gold history"
    );

    snapshots
}

#[cfg(test)]
mod tests {
    use crate::actor::{ActorId, Holder};
    use crate::amount::Copper;
    use crate::calendar::Calendar;
    use crate::error::Anomaly;
    use crate::history::{
        merge_holders, reconstruct, HistoryDecoder, HolderHistory, MinuteCopperLog, Observation,
    };
    use chrono::NaiveDate;

    use anyhow::{anyhow, Result};

    // 2024-06-01T00:00:00Z in minutes
    const JUNE_1: i64 = 28_620_000;
    const DAY: i64 = 1_440;

    fn date(d: u32) -> Result<NaiveDate> {
        NaiveDate::from_ymd_opt(2024, 6, d).ok_or(anyhow!("invalid date"))
    }

    fn gold(g: i64) -> Copper {
        Copper(g * 10_000)
    }

    fn obs(day: u32, balance: Copper) -> Observation {
        Observation {
            minute: JUNE_1 + (day as i64 - 1) * DAY + 600,
            balance,
        }
    }

    fn character(name: &str, observations: &[Observation]) -> HolderHistory {
        let holder = Holder::Character(ActorId::new(name, "Bar"));
        HolderHistory::from_observations(holder, observations, Calendar::Utc).0
    }

    #[test]
    fn decode_minute_copper() {
        let decoded = MinuteCopperLog.decode("minute,copper\n100,5\nbroken\n200,x\n300,7\n");
        assert_eq!(
            decoded,
            vec![
                Observation {
                    minute: 100,
                    balance: Copper(5)
                },
                Observation {
                    minute: 300,
                    balance: Copper(7)
                },
            ]
        );
        assert!(MinuteCopperLog.decode("time,amount\n1,2").is_empty());
    }

    #[test]
    fn carry_forward() -> Result<()> {
        let foo = character("Foo", &[obs(5, gold(100)), obs(9, gold(150))]);
        let snapshots = reconstruct(&[foo], Some(date(10)?));
        let actor = ActorId::new("Foo", "Bar");

        assert_eq!(snapshots.len(), 6);
        assert_eq!(snapshots[&date(5)?].characters[&actor], gold(100));
        assert_eq!(snapshots[&date(7)?].characters[&actor], gold(100));
        assert_eq!(snapshots[&date(8)?].characters[&actor], gold(100));
        assert_eq!(snapshots[&date(9)?].characters[&actor], gold(150));
        assert_eq!(snapshots[&date(10)?].characters[&actor], gold(150));

        Ok(())
    }

    #[test]
    fn late_actors_appear_on_first_reading() -> Result<()> {
        let foo = character("Foo", &[obs(1, gold(10))]);
        let baz = character("Baz", &[obs(3, gold(20))]);
        let bank = HolderHistory::from_observations(
            Holder::Warbank,
            &[obs(2, gold(1_000))],
            Calendar::Utc,
        )
        .0;
        let snapshots = reconstruct(&[foo, baz, bank], None);

        assert_eq!(snapshots[&date(1)?].characters.len(), 1);
        assert_eq!(snapshots[&date(1)?].warbank, None);
        assert_eq!(snapshots[&date(2)?].warbank, Some(gold(1_000)));
        assert_eq!(snapshots[&date(3)?].characters.len(), 2);

        let day3 = snapshots[&date(3)?].externalize();
        assert_eq!(day3.total, 30);
        assert_eq!(day3.bank, 1_000);
        assert_eq!(day3.characters["Baz-Bar"], 20);

        Ok(())
    }

    #[test]
    fn total_is_summed_before_truncation() -> Result<()> {
        let foo = character("Foo", &[obs(1, Copper(6_000))]);
        let baz = character("Baz", &[obs(1, Copper(6_000))]);
        let snapshot = &reconstruct(&[foo, baz], None)[&date(1)?];

        assert_eq!(snapshot.total(), Copper(12_000));
        let day = snapshot.externalize();
        assert_eq!(day.characters.values().sum::<i64>(), 0);
        assert_eq!(day.total, 1);

        Ok(())
    }

    #[test]
    fn last_reading_of_day_wins() -> Result<()> {
        let mut late = obs(2, gold(7));
        late.minute += 60;
        let foo = character("Foo", &[obs(2, gold(5)), late]);
        assert_eq!(foo.balance_on(date(2)?), Some(gold(7)));
        Ok(())
    }

    #[test]
    fn inconsistent_history_excludes_affected_days() -> Result<()> {
        let holder = Holder::Character(ActorId::new("Foo", "Bar"));
        let (history, anomaly) = HolderHistory::from_observations(
            holder,
            &[obs(1, gold(1)), obs(4, gold(4)), obs(3, gold(3))],
            Calendar::Utc,
        );

        assert!(matches!(
            anomaly,
            Some(Anomaly::InconsistentHistory { excluded_from, .. }) if excluded_from == date(3)?
        ));
        assert_eq!(history.balance_on(date(2)?), Some(gold(1)));
        assert_eq!(history.balance_on(date(3)?), None);
        assert_eq!(history.balance_on(date(5)?), None);

        let other = character("Baz", &[obs(1, gold(9)), obs(6, gold(9))]);
        let snapshots = reconstruct(&[history, other], None);
        assert_eq!(snapshots[&date(2)?].characters.len(), 2);
        assert_eq!(snapshots[&date(4)?].characters.len(), 1);

        Ok(())
    }

    #[test]
    fn merge_same_holder() -> Result<()> {
        let a = character("Foo", &[obs(1, gold(1)), obs(3, gold(3))]);
        let mut later = obs(3, gold(30));
        later.minute += 1;
        let b = character("Foo", &[obs(2, gold(2)), later]);
        let merged = merge_holders(vec![a, b]);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].balance_on(date(2)?), Some(gold(2)));
        assert_eq!(merged[0].balance_on(date(3)?), Some(gold(30)));
        Ok(())
    }

    #[test]
    fn empty_history() {
        assert!(reconstruct(&[], None).is_empty());
    }
}
