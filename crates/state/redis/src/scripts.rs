/// Lua script for a versioned write into a hash with `v` (value) and `ver`
/// (version) fields.
///
/// KEYS\[1\] = the hash key
/// ARGV\[1\] = new value
/// ARGV\[2\] = TTL in milliseconds (0 clears any existing expiry)
///
/// Returns the new version.
pub const SET_VERSIONED: &str = r"
local new_ver = (tonumber(redis.call('HGET', KEYS[1], 'ver')) or 0) + 1
redis.call('HSET', KEYS[1], 'v', ARGV[1], 'ver', new_ver)
local ttl = tonumber(ARGV[2])
if ttl > 0 then
    redis.call('PEXPIRE', KEYS[1], ttl)
else
    redis.call('PERSIST', KEYS[1])
end
return new_ver
";

/// Lua script for an atomic counter increment in the same `v` (value) and
/// `ver` (version) hash layout as [`SET_VERSIONED`].
///
/// KEYS\[1\] = the hash key
/// ARGV\[1\] = delta
/// ARGV\[2\] = TTL in milliseconds (0 leaves any existing expiry in place)
///
/// Returns the new counter value.
pub const INCREMENT_VERSIONED: &str = r"
local new_val = redis.call('HINCRBY', KEYS[1], 'v', ARGV[1])
redis.call('HINCRBY', KEYS[1], 'ver', 1)
local ttl = tonumber(ARGV[2])
if ttl > 0 then
    redis.call('PEXPIRE', KEYS[1], ttl)
end
return new_val
";

/// Lua script for atomic compare-and-swap using a hash with `v` (value) and
/// `ver` (version) fields.
///
/// KEYS\[1\] = the hash key
/// ARGV\[1\] = expected version
/// ARGV\[2\] = new value
/// ARGV\[3\] = TTL in milliseconds (0 leaves any existing expiry in place)
///
/// Returns a two-element array:
///   - `[1, new_ver]` on success
///   - `[0, cur_ver, cur_val]` on conflict
///   - `[1, 1]` if key does not exist and expected version is 0
pub const COMPARE_AND_SWAP: &str = r"
local exists = redis.call('EXISTS', KEYS[1])
local expected = tonumber(ARGV[1])
if exists == 0 then
    if expected ~= 0 then
        return {0, 0, false}
    end
    redis.call('HSET', KEYS[1], 'v', ARGV[2], 'ver', 1)
    local ttl = tonumber(ARGV[3])
    if ttl > 0 then
        redis.call('PEXPIRE', KEYS[1], ttl)
    end
    return {1, 1}
end
local cur_ver = tonumber(redis.call('HGET', KEYS[1], 'ver'))
if cur_ver ~= expected then
    local cur_val = redis.call('HGET', KEYS[1], 'v')
    return {0, cur_ver, cur_val}
end
local new_ver = cur_ver + 1
redis.call('HSET', KEYS[1], 'v', ARGV[2], 'ver', new_ver)
local ttl = tonumber(ARGV[3])
if ttl > 0 then
    redis.call('PEXPIRE', KEYS[1], ttl)
end
return {1, new_ver}
";
