//! Trades between two characters and currency adjustments

use crate::error::ReductionWarning;
use crate::event::Event;
use crate::payload::EventData;
use crate::reducer::ReducerConfig;
use crate::state::State;

/// Move items and currency from `from` to `to`, and the price back
///
/// Both characters are updated together or not at all.
pub fn trade_item(state: &mut State, event: &Event, _: &ReducerConfig) -> Result<(), ReductionWarning> {
    let EventData::TradeItem(trade) = &event.payload else {
        return Ok(());
    };
    state.with_pair(&trade.from, &trade.to, |seller, buyer| {
        for stack in &trade.items {
            let moved = seller.take_item(&stack.item_id, stack.quantity)?;
            buyer.add_item(moved);
        }
        for (currency, &amount) in &trade.currency {
            seller.adjust_currency(currency, -amount)?;
            buyer.adjust_currency(currency, amount)?;
        }
        for (currency, &amount) in &trade.price {
            buyer.adjust_currency(currency, -amount)?;
            seller.adjust_currency(currency, amount)?;
        }
        Ok(())
    })
}

/// Add a signed amount; a balance never drops below zero
pub fn modify_currency(
    state: &mut State,
    event: &Event,
    _: &ReducerConfig,
) -> Result<(), ReductionWarning> {
    let EventData::ModifyCurrency(change) = &event.payload else {
        return Ok(());
    };
    state.with_character(&change.character, |c| {
        c.adjust_currency(&change.currency, change.amount)
    })
}
