use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common_redis::{CustomRedisError, MockRedisClient};
use common_storage::{
    changed_key, AssignedKey, Codec, CounterRedisStorage, CounterStorage, Encoding, EncodingError,
    JsonEncoding, Key, KeyChangeable, KeyGetter, KeyPrefix, RedisStorage, Storage, StorageError,
    StorageProxy,
};
use serde::{Deserialize, Serialize};

fn init_tracing() {
    tracing_subscriber::fmt().with_test_writer().try_init().ok();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Account {
    id: Option<i64>,
    name: String,
}

impl Account {
    fn named(name: &str) -> Self {
        Account {
            id: None,
            name: name.to_string(),
        }
    }

    fn with_id(id: i64, name: &str) -> Self {
        Account {
            id: Some(id),
            name: name.to_string(),
        }
    }
}

impl KeyChangeable for Account {
    fn is_key_changeable(&self) -> bool {
        self.id.is_some()
    }
}

impl KeyGetter for Account {
    fn key(&self) -> Key {
        Key::Int(self.id.unwrap_or_default())
    }
}

impl AssignedKey for Account {
    fn assigned_key(&self) -> Option<Key> {
        changed_key(self)
    }
}

fn redis_tier(client: &MockRedisClient) -> Arc<RedisStorage<Account>> {
    Arc::new(RedisStorage::new(
        Arc::new(client.clone()),
        Codec::from_encoding(JsonEncoding),
        KeyPrefix::new("account"),
        Some(Duration::from_secs(600)),
    ))
}

type RedisTier = Arc<RedisStorage<Account>>;

fn redis_proxy(
    preferred: &MockRedisClient,
    backup: &MockRedisClient,
) -> StorageProxy<RedisTier, RedisTier, Account> {
    StorageProxy::new(redis_tier(preferred), redis_tier(backup))
}

async fn seed(client: &MockRedisClient, key: i64, account: &Account) {
    redis_tier(client).set(&Key::Int(key), account).await.unwrap();
}

/// Stands in for a database table that assigns ids on insert.
#[derive(Default)]
struct AccountTable {
    rows: Mutex<HashMap<Key, Account>>,
    next_id: Mutex<i64>,
}

#[async_trait]
impl Storage<Account> for AccountTable {
    async fn get(&self, key: &Key) -> Result<Account, StorageError> {
        self.rows
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::EmptyObject(key.to_string()))
    }

    async fn set(&self, key: &Key, value: &Account) -> Result<(), StorageError> {
        self.rows.lock().unwrap().insert(key.clone(), value.clone());
        Ok(())
    }

    async fn add(&self, _key: &Key, value: &mut Account) -> Result<(), StorageError> {
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        value.id = Some(1000 + *next_id);
        self.rows.lock().unwrap().insert(value.key(), value.clone());
        Ok(())
    }

    async fn multi_get(&self, keys: &[Key]) -> Result<HashMap<Key, Account>, StorageError> {
        let rows = self.rows.lock().unwrap();
        Ok(keys
            .iter()
            .filter_map(|key| rows.get(key).map(|row| (key.clone(), row.clone())))
            .collect())
    }

    async fn multi_set(&self, values: &HashMap<Key, Account>) -> Result<(), StorageError> {
        let mut rows = self.rows.lock().unwrap();
        for (key, value) in values {
            rows.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn delete(&self, keys: &[Key]) -> Result<(), StorageError> {
        let mut rows = self.rows.lock().unwrap();
        for key in keys {
            rows.remove(key);
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_single_tier_get_after_set_and_miss() {
    let client = MockRedisClient::new();
    let tier = redis_tier(&client);

    tier.set(&Key::Int(1), &Account::with_id(1, "ada")).await.unwrap();

    assert_eq!(
        tier.get(&Key::Int(1)).await.unwrap(),
        Account::with_id(1, "ada")
    );
    let err = tier.get(&Key::Int(2)).await.unwrap_err();
    assert!(err.is_miss(), "expected a miss, got {err:?}");
}

#[tokio::test]
async fn test_get_backfills_preferred_on_miss() {
    init_tracing();
    let preferred = MockRedisClient::new();
    let backup = MockRedisClient::new();
    seed(&backup, 7, &Account::with_id(7, "grace")).await;
    let proxy = redis_proxy(&preferred, &backup);

    let value = proxy.get(&Key::Int(7)).await.unwrap();

    assert_eq!(value, Account::with_id(7, "grace"));
    assert_eq!(
        redis_tier(&preferred).get(&Key::Int(7)).await.unwrap(),
        Account::with_id(7, "grace")
    );
    assert_eq!(preferred.ttl("account_7"), Some(Duration::from_secs(600)));
}

#[tokio::test]
async fn test_multi_get_merges_tiers_and_backfills() {
    init_tracing();
    let preferred = MockRedisClient::new();
    let backup = MockRedisClient::new();
    seed(&preferred, 1, &Account::with_id(1, "a")).await;
    seed(&backup, 2, &Account::with_id(2, "b")).await;
    let proxy = redis_proxy(&preferred, &backup);

    let found = proxy
        .multi_get(&[Key::Int(1), Key::Int(2), Key::Int(3)])
        .await
        .unwrap();

    assert_eq!(found.len(), 2);
    assert_eq!(found[&Key::Int(1)], Account::with_id(1, "a"));
    assert_eq!(found[&Key::Int(2)], Account::with_id(2, "b"));
    assert!(!found.contains_key(&Key::Int(3)));

    assert!(preferred.contains("account_2"));
    assert!(!preferred.contains("account_3"));
}

#[tokio::test]
async fn test_delete_removes_from_both_tiers() {
    let preferred = MockRedisClient::new();
    let backup = MockRedisClient::new();
    seed(&preferred, 1, &Account::with_id(1, "a")).await;
    seed(&backup, 1, &Account::with_id(1, "a")).await;
    let proxy = redis_proxy(&preferred, &backup);

    proxy.delete(&[Key::Int(1)]).await.unwrap();

    assert!(proxy.get(&Key::Int(1)).await.unwrap_err().is_miss());
    assert!(redis_tier(&preferred)
        .get(&Key::Int(1))
        .await
        .unwrap_err()
        .is_miss());
    assert!(redis_tier(&backup)
        .get(&Key::Int(1))
        .await
        .unwrap_err()
        .is_miss());
    assert!(proxy.multi_get(&[Key::Int(1)]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_add_writes_preferred_under_assigned_key() {
    let preferred = MockRedisClient::new();
    let table = Arc::new(AccountTable::default());
    let proxy = StorageProxy::<_, _, Account>::new(redis_tier(&preferred), table.clone());

    let mut account = Account::named("new");
    proxy.add(&Key::string("pending"), &mut account).await.unwrap();

    assert_eq!(account.id, Some(1001));
    assert_eq!(preferred.keys(), vec!["account_1001".to_string()]);
    assert_eq!(
        proxy.get(&Key::Int(1001)).await.unwrap(),
        Account::with_id(1001, "new")
    );
    assert_eq!(
        table.get(&Key::Int(1001)).await.unwrap(),
        Account::with_id(1001, "new")
    );
}

#[tokio::test]
async fn test_add_keeps_callers_key_when_backup_assigns_nothing() {
    let preferred = MockRedisClient::new();
    let backup = MockRedisClient::new();
    let proxy = redis_proxy(&preferred, &backup);

    let mut account = Account::named("new");
    proxy.add(&Key::string("pending"), &mut account).await.unwrap();

    assert_eq!(account.id, None);
    assert_eq!(preferred.keys(), vec!["account_pending".to_string()]);
    assert_eq!(backup.keys(), vec!["account_pending".to_string()]);
}

#[tokio::test]
async fn test_add_plain_values_keep_callers_key() {
    let preferred = MockRedisClient::new();
    let backup = MockRedisClient::new();
    let tier = |client: &MockRedisClient| {
        Arc::new(RedisStorage::new(
            Arc::new(client.clone()),
            Codec::<String>::from_encoding(JsonEncoding),
            KeyPrefix::new("name"),
            None,
        ))
    };
    let proxy = StorageProxy::<_, _, String>::new(tier(&preferred), tier(&backup));

    let mut name = "linus".to_string();
    proxy.add(&Key::Int(7), &mut name).await.unwrap();

    assert_eq!(preferred.keys(), vec!["name_7".to_string()]);
}

#[tokio::test]
async fn test_read_through_from_table_backup() {
    let preferred = MockRedisClient::new();
    let table = Arc::new(AccountTable::default());
    table
        .set(&Key::Int(5), &Account::with_id(5, "linus"))
        .await
        .unwrap();
    let proxy = StorageProxy::<_, _, Account>::new(redis_tier(&preferred), table);

    let found = proxy.multi_get(&[Key::Int(5), Key::Int(6)]).await.unwrap();

    assert_eq!(found.len(), 1);
    assert!(preferred.contains("account_5"));
}

/// Refuses to encode accounts without a name.
struct NamedOnly;

impl Encoding<Account> for NamedOnly {
    fn marshal(&self, value: &Account) -> Result<Vec<u8>, EncodingError> {
        if value.name.is_empty() {
            return Err(EncodingError::Native("account has no name".to_string()));
        }
        Ok(serde_json::to_vec(value)?)
    }

    fn unmarshal(&self, data: &[u8]) -> Result<Account, EncodingError> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[tokio::test]
async fn test_multi_set_persists_everything_but_the_unencodable_entry() {
    init_tracing();
    let preferred = MockRedisClient::new();
    let backup = MockRedisClient::new();
    let tier = |client: &MockRedisClient| {
        Arc::new(RedisStorage::new(
            Arc::new(client.clone()),
            Codec::<Account>::from_encoding(NamedOnly),
            KeyPrefix::new("account"),
            None,
        ))
    };
    let proxy = StorageProxy::<_, _, Account>::new(tier(&preferred), tier(&backup));

    let values = HashMap::from([
        (Key::Int(1), Account::with_id(1, "a")),
        (Key::Int(2), Account::with_id(2, "")),
        (Key::Int(3), Account::with_id(3, "c")),
    ]);
    proxy.multi_set(&values).await.unwrap();

    for client in [&preferred, &backup] {
        assert_eq!(
            client.keys(),
            vec!["account_1".to_string(), "account_3".to_string()]
        );
    }
}

fn counter_tier(client: &MockRedisClient) -> Arc<CounterRedisStorage> {
    Arc::new(CounterRedisStorage::new(
        Arc::new(client.clone()),
        KeyPrefix::new("quota"),
        Some(Duration::from_secs(60)),
    ))
}

#[tokio::test]
async fn test_counter_decr_below_zero_reports_zero() {
    let client = MockRedisClient::new();
    let counters = counter_tier(&client);

    counters.incr(&Key::Int(1), 2).await.unwrap();
    let err = counters.decr(&Key::Int(1), 5).await.unwrap_err();

    assert_eq!(err.counter_value(), Some(0));
}

#[tokio::test]
async fn test_proxy_counters_update_both_tiers() {
    let preferred = MockRedisClient::new();
    let backup = MockRedisClient::new();
    let proxy =
        StorageProxy::<_, _, i64>::new(counter_tier(&preferred), counter_tier(&backup));

    assert_eq!(proxy.incr(&Key::Int(1), 3).await.unwrap(), 3);
    assert_eq!(proxy.decr(&Key::Int(1), 1).await.unwrap(), 2);

    assert_eq!(preferred.value("quota_1"), Some(b"2".to_vec()));
    assert_eq!(backup.value("quota_1"), Some(b"2".to_vec()));
    assert_eq!(proxy.get(&Key::Int(1)).await.unwrap(), 2);
}

#[tokio::test]
async fn test_proxy_counter_backup_failure_reports_preferred_value() {
    let preferred = MockRedisClient::new();
    let backup = MockRedisClient::new().fail_op("incr_by", CustomRedisError::Timeout);
    let proxy =
        StorageProxy::<_, _, i64>::new(counter_tier(&preferred), counter_tier(&backup));

    let err = proxy.incr(&Key::Int(1), 4).await.unwrap_err();

    assert!(matches!(err, StorageError::PartialCounter { value: 4, .. }));
    assert_eq!(err.counter_value(), Some(4));
    assert_eq!(preferred.value("quota_1"), Some(b"4".to_vec()));
}

#[tokio::test]
async fn test_proxy_decr_underflow_on_backup_is_partial() {
    let preferred = MockRedisClient::new().with_value("quota_1", "5");
    let backup = MockRedisClient::new().with_value("quota_1", "1");
    let proxy =
        StorageProxy::<_, _, i64>::new(counter_tier(&preferred), counter_tier(&backup));

    let err = proxy.decr(&Key::Int(1), 3).await.unwrap_err();

    match &err {
        StorageError::PartialCounter { value, source } => {
            assert_eq!(*value, 2);
            assert!(matches!(**source, StorageError::CounterUnderflow { .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.counter_value(), Some(2));
    assert!(!err.is_retryable());
    assert_eq!(preferred.value("quota_1"), Some(b"2".to_vec()));
}

#[tokio::test]
async fn test_proxy_counter_preferred_failure_skips_backup() {
    let preferred = MockRedisClient::new().fail_op("decr_by", CustomRedisError::Timeout);
    let backup = MockRedisClient::new();
    let proxy =
        StorageProxy::<_, _, i64>::new(counter_tier(&preferred), counter_tier(&backup));

    let err = proxy.decr(&Key::Int(1), 1).await.unwrap_err();

    assert!(matches!(err, StorageError::Driver { .. }));
    assert!(backup.get_calls().is_empty());
}
