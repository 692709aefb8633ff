use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tradebot_core::cart::{AdminCart, Cart, CartQueue, CartServices, UserCart};
use tradebot_core::domain::currency::Currencies;
use tradebot_core::domain::offer::{
    EconItem, Offer, OfferAction, OfferFilter, OfferId, OfferItem, OfferState, OfferStatus,
};
use tradebot_core::domain::pricelist::{Intent, PricelistEntry};
use tradebot_core::domain::sku::Sku;
use tradebot_core::domain::SteamId;
use tradebot_core::errors::{CartError, CartQueueError};
use tradebot_core::inventory::{Inventory, InventoryManager};
use tradebot_core::memory::{
    AcceptScript, InMemoryPollDataStore, InMemoryProtocol, RecordingMessenger, ScriptedHandler, StaticBanList,
    StaticPricelist,
};
use tradebot_core::ports::{Decision, TradeProtocol};
use tradebot_core::trades::{ReservationHolder, RetryPolicy, Trades, TradesSettings, ITEMS_IN_TRADE};

const BOT: &str = "76561198000000001";
const ALICE: &str = "76561198000000011";
const BOB: &str = "76561198000000012";
const CAROL: &str = "76561198000000013";
const DAVE: &str = "76561198000000014";

const CAP: &str = "263;6";

fn cap_entry() -> PricelistEntry {
    PricelistEntry {
        sku: Sku::new(CAP),
        name: "Ellis' Cap".to_string(),
        enabled: true,
        intent: Intent::Bank,
        min: 0,
        max: Some(2),
        buy: Currencies::metal_only(Decimal::new(133, 2)),
        sell: Currencies::metal_only(Decimal::new(155, 2)),
        autoprice: true,
        time: None,
    }
}

fn key_entry() -> PricelistEntry {
    PricelistEntry {
        sku: Sku::key(),
        name: "Mann Co. Supply Crate Key".to_string(),
        enabled: true,
        intent: Intent::Bank,
        min: 0,
        max: None,
        buy: Currencies::metal_only(Decimal::new(5000, 2)),
        sell: Currencies::metal_only(Decimal::new(5011, 2)),
        autoprice: true,
        time: None,
    }
}

struct Bot {
    protocol: Arc<InMemoryProtocol>,
    store: Arc<InMemoryPollDataStore>,
    handler: Arc<ScriptedHandler>,
    messenger: RecordingMessenger,
    trades: Arc<Trades>,
    services: Arc<CartServices>,
}

fn bot_with(own_items: Vec<EconItem>, bans: StaticBanList) -> Bot {
    let protocol = Arc::new(InMemoryProtocol::new());
    protocol.set_inventory(SteamId::new(BOT), own_items.clone());

    let pricelist = Arc::new(
        StaticPricelist::new(Decimal::new(5011, 2)).with_entry(cap_entry()).with_entry(key_entry()),
    );
    let inventory = Arc::new(InventoryManager::new(
        Inventory::from_items(SteamId::new(BOT), own_items),
        pricelist.clone(),
    ));
    let store = Arc::new(InMemoryPollDataStore::default());
    let handler = Arc::new(ScriptedHandler::default());
    let trades = Arc::new(Trades::new(
        protocol.clone(),
        inventory,
        handler.clone(),
        store.clone(),
        TradesSettings {
            retry: RetryPolicy::immediate(5),
            confirmation_delay: Duration::ZERO,
            confirmations_enabled: true,
        },
    ));
    let services = Arc::new(CartServices {
        trades: trades.clone(),
        pricelist,
        bans: Arc::new(bans),
        offer_message: "Thanks for trading!".to_string(),
    });

    Bot { protocol, store, handler, messenger: RecordingMessenger::default(), trades, services }
}

fn bot(own_items: Vec<EconItem>) -> Bot {
    bot_with(own_items, StaticBanList::default())
}

/// 14 scrap, the sell price of one cap.
fn exact_payment() -> Vec<EconItem> {
    vec![
        EconItem::tf2("r1", Sku::refined(), true),
        EconItem::tf2("m1", Sku::reclaimed(), true),
        EconItem::tf2("s1", Sku::scrap(), true),
        EconItem::tf2("s2", Sku::scrap(), true),
    ]
}

fn assets(items: &[OfferItem]) -> Vec<&str> {
    items.iter().map(|item| item.assetid.as_str()).collect()
}

#[tokio::test]
async fn user_cart_sells_item_and_returns_metal_change() {
    let bot = bot(vec![
        EconItem::tf2("c1", CAP, true),
        EconItem::tf2("m1", Sku::reclaimed(), true),
        EconItem::tf2("s1", Sku::scrap(), true),
    ]);
    bot.protocol.set_inventory(
        SteamId::new(ALICE),
        vec![EconItem::tf2("r1", Sku::refined(), true), EconItem::tf2("r2", Sku::refined(), true)],
    );

    let mut cart = UserCart::new(SteamId::new(ALICE), bot.services.clone());
    cart.add_our_item(Sku::new(CAP), 1);

    let alteration = cart.construct_offer().await.expect("constructed");
    assert_eq!(alteration, None);

    let offer = cart.offer().expect("draft").clone();
    assert_eq!(assets(&offer.items_to_give), vec!["c1", "s1", "m1"]);
    assert_eq!(assets(&offer.items_to_receive), vec!["r1", "r2"]);
    assert_eq!(offer.message, "Thanks for trading!");

    let value = offer.data.value.clone().expect("value breakdown");
    assert_eq!(value.our.total, 18);
    assert_eq!(value.their.total, 18);
    assert_eq!(cart.summary(), "You will be offered 1 Ellis' Cap, 1 Scrap Metal, 1 Reclaimed Metal for 2 x Refined Metal");

    let status = cart.send_offer().await.expect("sent");
    assert_eq!(status, OfferStatus::Sent);
    let reserved: Vec<String> = bot.trades.items_in_trade().into_iter().collect();
    assert_eq!(reserved, vec!["c1".to_string(), "m1".to_string(), "s1".to_string()]);
}

#[tokio::test]
async fn user_cart_pays_for_bought_item_within_stock_limit() {
    let bot = bot(vec![
        EconItem::tf2("c1", CAP, true),
        EconItem::tf2("r9", Sku::refined(), true),
        EconItem::tf2("m1", Sku::reclaimed(), true),
        EconItem::tf2("s1", Sku::scrap(), true),
    ]);
    bot.protocol.set_inventory(
        SteamId::new(BOB),
        vec![
            EconItem::tf2("p1", CAP, true),
            EconItem::tf2("p2", CAP, true),
            EconItem::tf2("p3", CAP, true),
        ],
    );

    let mut cart = UserCart::new(SteamId::new(BOB), bot.services.clone());
    cart.add_their_item(Sku::new(CAP), 3);

    let alteration = cart.construct_offer().await.expect("constructed");

    assert_eq!(alteration.as_deref(), Some("I can only buy 1 more Ellis' Cap"));
    assert_eq!(cart.ledger().their_amount(&Sku::new(CAP)), 1);
    let offer = cart.offer().expect("draft");
    assert_eq!(assets(&offer.items_to_give), vec!["m1", "r9"]);
    assert_eq!(assets(&offer.items_to_receive), vec!["p1"]);
}

#[tokio::test]
async fn user_cart_reduces_to_what_we_hold() {
    let bot = bot(vec![
        EconItem::tf2("c1", CAP, true),
        EconItem::tf2("m1", Sku::reclaimed(), true),
        EconItem::tf2("s1", Sku::scrap(), true),
    ]);
    bot.protocol.set_inventory(
        SteamId::new(ALICE),
        (1..=10).map(|n| EconItem::tf2(format!("r{n}"), Sku::refined(), true)).collect(),
    );

    let mut cart = UserCart::new(SteamId::new(ALICE), bot.services.clone());
    cart.add_our_item(Sku::new(CAP), 3);

    let alteration = cart.construct_offer().await.expect("constructed");

    assert_eq!(alteration.as_deref(), Some("I only have 1 Ellis' Cap"));
    assert_eq!(cart.ledger().our_amount(&Sku::new(CAP)), 1);
}

#[tokio::test]
async fn missing_key_empties_the_cart_with_an_alteration() {
    let bot = bot(Vec::new());

    let mut cart = UserCart::new(SteamId::new(ALICE), bot.services.clone());
    cart.add_our_item(Sku::key(), 1);

    let alteration = cart.construct_offer().await.expect("alteration, not an error");

    assert_eq!(alteration.as_deref(), Some("I don't have any Mann Co. Supply Crate Key"));
    assert!(cart.ledger().our().is_empty());
    assert!(cart.is_empty());
    assert!(cart.offer().is_none());
}

#[tokio::test]
async fn user_cart_rejects_unpriced_and_unaffordable_trades() {
    let bot = bot(vec![EconItem::tf2("c1", CAP, true)]);
    bot.protocol.set_inventory(SteamId::new(ALICE), vec![EconItem::tf2("s1", Sku::scrap(), true)]);

    let mut unpriced = UserCart::new(SteamId::new(ALICE), bot.services.clone());
    unpriced.add_their_item(Sku::new("5027;6"), 1);
    let error = unpriced.construct_offer().await.unwrap_err();
    assert_eq!(error, CartError::rejected("5027;6 is not in my pricelist"));

    let mut poor = UserCart::new(SteamId::new(ALICE), bot.services.clone());
    poor.add_our_item(Sku::new(CAP), 1);
    let error = poor.construct_offer().await.unwrap_err();
    assert_eq!(error, CartError::rejected("you don't have enough pure"));

    let empty_error = UserCart::new(SteamId::new(ALICE), bot.services.clone()).construct_offer().await.unwrap_err();
    assert_eq!(empty_error, CartError::Empty);
}

#[tokio::test]
async fn banned_partner_is_rejected_before_sending() {
    let bot = bot_with(
        vec![EconItem::tf2("c1", CAP, true)],
        StaticBanList::default().with_banned(SteamId::new(ALICE)),
    );
    bot.protocol.set_inventory(
        SteamId::new(ALICE),
        exact_payment(),
    );
    let mut cart = UserCart::new(SteamId::new(ALICE), bot.services.clone());
    cart.add_our_item(Sku::new(CAP), 1);
    cart.construct_offer().await.expect("constructed");

    let error = cart.send_offer().await.unwrap_err();

    assert!(error.user_reason().is_some_and(|reason| reason.contains("banned")));
    assert_eq!(bot.protocol.send_attempts(), 0);
    assert!(bot.trades.items_in_trade().is_empty());
}

#[tokio::test]
async fn admin_cart_skips_partner_checks() {
    let bot = bot_with(
        vec![EconItem::tf2("c1", CAP, true)],
        StaticBanList::default().with_banned(SteamId::new(BOB)),
    );
    bot.protocol.set_escrow_days(SteamId::new(BOB), 15);
    let mut cart = AdminCart::new(SteamId::new(BOB), bot.services.clone());
    cart.add_our_item(Sku::new(CAP), 1);
    cart.construct_offer().await.expect("constructed");

    assert_eq!(cart.send_offer().await.expect("sent"), OfferStatus::Sent);
    assert_eq!(bot.protocol.send_attempts(), 1);
}

#[tokio::test]
async fn escrow_days_block_user_offers() {
    let bot = bot(vec![EconItem::tf2("c1", CAP, true)]);
    bot.protocol.set_escrow_days(SteamId::new(ALICE), 15);
    bot.protocol.set_inventory(
        SteamId::new(ALICE),
        exact_payment(),
    );
    let mut cart = UserCart::new(SteamId::new(ALICE), bot.services.clone());
    cart.add_our_item(Sku::new(CAP), 1);
    cart.construct_offer().await.expect("constructed");

    let error = cart.send_offer().await.unwrap_err();

    assert!(error.user_reason().is_some_and(|reason| reason.contains("held for 15 days")));
    assert_eq!(bot.protocol.send_attempts(), 0);
}

#[tokio::test]
async fn admin_cart_moves_items_without_pricing() {
    let bot = bot(vec![EconItem::tf2("k1", Sku::key(), true), EconItem::tf2("u1", "5027;6", true)]);
    bot.protocol.set_inventory(SteamId::new(CAROL), vec![EconItem::tf2("x1", "30000;5", true)]);

    let mut cart = AdminCart::new(SteamId::new(CAROL), bot.services.clone());
    cart.add_our_item(Sku::new("5027;6"), 1);
    cart.add_our_item(Sku::key(), 2);
    cart.add_their_item(Sku::new("30000;5"), 1);

    let alteration = cart.construct_offer().await.expect("constructed");

    assert_eq!(alteration.as_deref(), Some("I only have 1 Mann Co. Supply Crate Key"));
    let offer = cart.offer().expect("draft");
    assert_eq!(offer.items_to_give.len(), 2);
    assert_eq!(assets(&offer.items_to_receive), vec!["x1"]);
    assert!(offer.data.value.is_none());
}

fn admin_cart(bot: &Bot, partner: &str, sku: &str) -> Box<dyn Cart> {
    let mut cart = AdminCart::new(SteamId::new(partner), bot.services.clone());
    cart.add_our_item(Sku::new(sku), 1);
    Box::new(cart)
}

#[tokio::test]
async fn queue_processes_in_arrival_order_and_honours_dequeue() {
    let bot = bot(vec![
        EconItem::tf2("a", "1;6", true),
        EconItem::tf2("b", "2;6", true),
        EconItem::tf2("c", "3;6", true),
    ]);
    let queue = Arc::new(CartQueue::new(Arc::new(bot.messenger.clone())));

    assert_eq!(queue.enqueue(admin_cart(&bot, ALICE, "1;6")), Ok(0));
    assert_eq!(queue.enqueue(admin_cart(&bot, BOB, "2;6")), Ok(1));
    assert_eq!(queue.enqueue(admin_cart(&bot, CAROL, "3;6")), Ok(2));
    assert_eq!(queue.enqueue(admin_cart(&bot, BOB, "2;6")), Err(CartQueueError::AlreadyQueued));
    assert_eq!(queue.get_position(&SteamId::new(CAROL)), Some(2));

    assert!(queue.dequeue(&SteamId::new(BOB)));
    assert!(!queue.dequeue(&SteamId::new(BOB)));
    assert_eq!(queue.get_position(&SteamId::new(CAROL)), Some(1));
    let snapshot = queue.get_cart(&SteamId::new(CAROL)).expect("queued cart");
    assert_eq!(snapshot.ledger.our_amount(&Sku::new("3;6")), 1);

    queue.handle_queue().await;

    let partners: Vec<SteamId> = bot.protocol.offers().into_iter().map(|offer| offer.partner).collect();
    assert_eq!(partners, vec![SteamId::new(ALICE), SteamId::new(CAROL)]);
    assert!(bot.messenger.messages_for(&SteamId::new(BOB)).is_empty());
    assert!(queue.is_empty());
    assert_eq!(queue.active_partner(), None);

    let alice = bot.messenger.messages_for(&SteamId::new(ALICE));
    assert!(alice[0].starts_with("Please wait while I process your offer! You will be offered 1 1;6 for nothing"));
}

#[tokio::test]
async fn queue_failure_does_not_block_later_carts() {
    let bot = bot(vec![EconItem::tf2("a", "1;6", true)]);
    bot.protocol.fail_inventory(SteamId::new(DAVE));
    let queue = Arc::new(CartQueue::new(Arc::new(bot.messenger.clone())));

    let mut broken = AdminCart::new(SteamId::new(DAVE), bot.services.clone());
    broken.add_their_item(Sku::new("9;6"), 1);
    queue.enqueue(Box::new(broken)).expect("queued");
    let mut gone = AdminCart::new(SteamId::new(BOB), bot.services.clone());
    gone.add_our_item(Sku::new("404;6"), 1);
    queue.enqueue(Box::new(gone)).expect("queued");
    queue.enqueue(admin_cart(&bot, ALICE, "1;6")).expect("queued");

    queue.handle_queue().await;

    assert_eq!(
        bot.messenger.messages_for(&SteamId::new(DAVE)),
        vec!["Something went wrong while trying to make the offer, try again later!".to_string()]
    );
    let bob = bot.messenger.messages_for(&SteamId::new(BOB));
    assert_eq!(bob[0], "Your offer has been altered! Reason: I don't have any 404;6.");
    assert!(bob[1].starts_with("None of the items you asked for"));
    assert_eq!(bot.protocol.offers().len(), 1);
    assert_eq!(bot.protocol.offers()[0].partner, SteamId::new(ALICE));
}

#[tokio::test]
async fn queue_reports_pending_confirmation() {
    let bot = bot(vec![EconItem::tf2("a", "1;6", true)]);
    bot.protocol.require_confirmation(true);
    let queue = Arc::new(CartQueue::new(Arc::new(bot.messenger.clone())));
    queue.enqueue(admin_cart(&bot, ALICE, "1;6")).expect("queued");

    queue.handle_queue().await;

    let alice = bot.messenger.messages_for(&SteamId::new(ALICE));
    assert_eq!(
        alice.last().map(String::as_str),
        Some("Your offer has been made, please wait while I accept the mobile confirmation.")
    );
}

#[tokio::test]
async fn enqueue_alone_drains_the_queue() {
    let bot = bot(vec![EconItem::tf2("a", "1;6", true)]);
    let queue = Arc::new(CartQueue::new(Arc::new(bot.messenger.clone())));

    queue.enqueue(admin_cart(&bot, ALICE, "1;6")).expect("queued");
    tokio::time::timeout(Duration::from_secs(5), async {
        while bot.protocol.offers().is_empty() || !queue.is_empty() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("queue drained");

    let offers = bot.protocol.offers();
    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0].partner, SteamId::new(ALICE));
    assert_eq!(assets(&offers[0].items_to_give), vec!["a"]);
}

#[tokio::test]
async fn received_offers_are_reviewed_once_and_acted_on() {
    let bot = bot(Vec::new());
    let accepted = bot.protocol.insert_received(SteamId::new(ALICE), &[], &["g1"]);
    let declined = bot.protocol.insert_received(SteamId::new(BOB), &[], &["g2"]);
    bot.handler.decide(accepted.clone(), Decision::new(OfferAction::Accept).with_reason("gift"));
    bot.handler.decide(declined.clone(), Decision::new(OfferAction::Decline));

    let offer = bot.protocol.get_offer(&accepted).await.expect("offer");
    bot.trades.on_new_offer(&offer).await;
    bot.trades.on_new_offer(&offer).await;

    let list = bot.protocol.get_offers(OfferFilter::ActiveOnly).await.expect("list");
    bot.trades.on_offer_list(&list).await;
    bot.trades.on_offer_list(&list).await;

    assert_eq!(bot.handler.reviewed(), vec![accepted.clone(), declined.clone()]);
    assert_eq!(bot.protocol.offer_state(&accepted), Some(OfferState::Accepted));
    assert_eq!(bot.protocol.offer_state(&declined), Some(OfferState::Declined));

    let poll = bot.store.snapshot().expect("persisted");
    let data = &poll.offer_data[&accepted];
    assert!(data.handled_by_us);
    let action = data.action.as_ref().expect("action recorded");
    assert_eq!(action.action, OfferAction::Accept);
    assert_eq!(action.reason.as_deref(), Some("gift"));
    assert!(data.handle_timestamp.is_some() && data.action_timestamp.is_some());
}

#[tokio::test]
async fn accepted_offer_removes_given_items_and_notifies_handler() {
    let own = vec![EconItem::tf2("c1", CAP, true), EconItem::tf2("c2", CAP, true)];
    let bot = bot(own);
    let mut offer = Offer::draft(SteamId::new(ALICE));
    offer.add_my_item(OfferItem::tf2("c1"));
    bot.trades.send_offer(&mut offer).await.expect("sent");

    // The protocol layer has already moved the item by the time it reports.
    bot.protocol.set_inventory(SteamId::new(BOT), vec![EconItem::tf2("c2", CAP, true)]);
    offer.state = OfferState::Accepted;
    bot.trades.on_offer_changed(&offer, Some(OfferState::Active)).await;

    assert!(bot.trades.items_in_trade().is_empty());
    assert_eq!(bot.trades.inventory().inventory().get_amount(&Sku::new(CAP)), 1);
    let changes = bot.handler.changes();
    assert_eq!(changes, vec![(offer.id.clone(), Some(OfferState::Active), OfferState::Accepted)]);
}

/// Replays a recorded sequence of state transitions and checks that no
/// asset is ever committed to two live offers, then restarts from the
/// persisted poll data.
#[tokio::test]
async fn reservations_stay_exclusive_across_replay_and_restart() {
    let bot = bot(Vec::new());
    let transitions: Vec<(&str, OfferState, &[&str])> = vec![
        ("100", OfferState::CreatedNeedsConfirmation, &["a1", "a2"]),
        ("101", OfferState::Active, &["a3"]),
        ("100", OfferState::Active, &["a1", "a2"]),
        ("102", OfferState::Active, &["a1"]),
        ("100", OfferState::Canceled, &["a1", "a2"]),
        ("103", OfferState::Active, &["a1", "a2"]),
        ("101", OfferState::InvalidItems, &["a3"]),
        ("104", OfferState::Active, &["a3"]),
    ];

    let mut live: BTreeMap<String, (OfferState, Vec<String>)> = BTreeMap::new();
    for (id, state, give) in transitions {
        let mut offer = Offer::draft(SteamId::new(ALICE));
        offer.id = Some(OfferId(id.to_string()));
        offer.state = state;
        for asset in give {
            offer.add_my_item(OfferItem::tf2(*asset));
        }
        let old_state = live.get(id).map(|(state, _)| *state);
        bot.trades.on_offer_changed(&offer, old_state).await;
        live.insert(id.to_string(), (state, give.iter().map(|asset| asset.to_string()).collect()));

        let reservations = bot.trades.reservations();
        let mut owners: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (offer_id, (state, give)) in &live {
            let held = reservations.held_by(&ReservationHolder::Offer(OfferId(offer_id.clone())));
            if !state.holds_items() {
                assert!(held.is_empty(), "offer {offer_id} left a committed state but still holds items");
                continue;
            }
            for asset in give {
                if held.contains(asset) {
                    owners.entry(asset.clone()).or_default().push(offer_id.clone());
                }
            }
        }
        assert!(owners.values().all(|holders| holders.len() == 1), "asset held twice: {owners:?}");
    }

    let expected = bot.trades.items_in_trade();
    assert_eq!(expected.into_iter().collect::<Vec<_>>(), vec!["a1", "a2", "a3"]);

    let restarted = self::bot(Vec::new());
    restarted.trades.set_poll_data(bot.store.snapshot().expect("persisted"));
    assert_eq!(restarted.trades.items_in_trade(), bot.trades.items_in_trade());
}

#[tokio::test]
async fn offer_list_releases_offers_that_left_the_active_list() {
    let bot = bot(Vec::new());
    let mut finished = Offer::draft(SteamId::new(ALICE));
    finished.add_my_item(OfferItem::tf2("a1"));
    bot.trades.send_offer(&mut finished).await.expect("sent");
    let mut live = Offer::draft(SteamId::new(BOB));
    live.add_my_item(OfferItem::tf2("a2"));
    bot.trades.send_offer(&mut live).await.expect("sent");

    let finished_id = finished.id.clone().expect("id");
    bot.protocol.set_offer_state(&finished_id, OfferState::Declined).expect("known offer");
    let list = bot.protocol.get_offers(OfferFilter::ActiveOnly).await.expect("list");
    bot.trades.on_offer_list(&list).await;

    let reserved: Vec<String> = bot.trades.items_in_trade().into_iter().collect();
    assert_eq!(reserved, vec!["a2".to_string()]);
    let holder = ReservationHolder::Offer(live.id.clone().expect("id"));
    assert_eq!(bot.trades.reservations().holder_of("a2"), Some(&holder));
}

#[tokio::test]
async fn received_offer_for_items_in_another_trade_is_declined() {
    let bot = bot(vec![EconItem::tf2("c1", CAP, true)]);
    let mut ours = Offer::draft(SteamId::new(ALICE));
    ours.add_my_item(OfferItem::tf2("c1"));
    bot.trades.send_offer(&mut ours).await.expect("sent");
    let sent_id = ours.id.clone().expect("id");

    let theirs = bot.protocol.insert_received(SteamId::new(BOB), &["c1"], &["x1"]);
    bot.handler.decide(theirs.clone(), Decision::new(OfferAction::Accept));
    let offer = bot.protocol.get_offer(&theirs).await.expect("offer");
    bot.trades.on_new_offer(&offer).await;

    assert_eq!(bot.protocol.offer_state(&sent_id), Some(OfferState::Active));
    assert_eq!(bot.protocol.offer_state(&theirs), Some(OfferState::Declined));
    assert_eq!(bot.trades.reservations().holder_of("c1"), Some(&ReservationHolder::Offer(sent_id)));
    assert!(bot.handler.reviewed().is_empty());

    let poll = bot.store.snapshot().expect("persisted");
    let action = poll.offer_data[&theirs].action.clone().expect("action recorded");
    assert_eq!(action.action, OfferAction::Decline);
    assert_eq!(action.reason.as_deref(), Some(ITEMS_IN_TRADE));
}

#[tokio::test]
async fn handled_received_offer_keeps_its_items_across_restart() {
    let bot = bot(vec![EconItem::tf2("c1", CAP, true)]);
    let theirs = bot.protocol.insert_received(SteamId::new(BOB), &["c1"], &["x1"]);
    bot.protocol.script_accept(AcceptScript::Succeed(OfferStatus::Pending));
    bot.handler.decide(theirs.clone(), Decision::new(OfferAction::Accept));
    let offer = bot.protocol.get_offer(&theirs).await.expect("offer");
    bot.trades.on_new_offer(&offer).await;

    let restarted = self::bot(vec![EconItem::tf2("c1", CAP, true)]);
    restarted.trades.set_poll_data(bot.store.snapshot().expect("persisted"));

    assert_eq!(restarted.trades.reservations().holder_of("c1"), Some(&ReservationHolder::Offer(theirs)));
    let mut ours = Offer::draft(SteamId::new(ALICE));
    ours.add_my_item(OfferItem::tf2("c1"));
    assert!(restarted.trades.send_offer(&mut ours).await.is_err());
}
