//! JavaScript snippets evaluated by `mongosh --eval`.
//!
//! Every script prints exactly one line of relaxed Extended JSON on stdout.
//! User-provided strings are embedded as JSON string literals, never spliced
//! in raw.

use serde_json::Value;

/// Builds the `serverStatus` script, keeping only the sections the dashboard
/// reads.
pub(super) fn build_status_script() -> String {
    r#"
        var s = db.adminCommand({ serverStatus: 1 });
        print(EJSON.stringify({
            connections: s.connections,
            mem: s.mem,
            globalLock: s.globalLock,
            opcounters: s.opcounters,
            backgroundFlushing: s.backgroundFlushing
        }, { relaxed: true }));
    "#
    .to_string()
}

/// Builds the `currentOp` script.
///
/// Newer servers report the operation document under `command` instead of
/// `query`; both are mapped to `query`.
pub(super) fn build_current_op_script() -> String {
    r#"
        var ops = db.adminCommand({ currentOp: 1 }).inprog.map(function (op) {
            return {
                opid: op.opid,
                op: op.op,
                ns: op.ns,
                query: op.query !== undefined ? op.query : op.command,
                secs_running: op.secs_running
            };
        });
        print(EJSON.stringify(ops, { relaxed: true }));
    "#
    .to_string()
}

/// Builds the `replSetGetStatus` script.
///
/// A server outside a replica set answers `ok: 0`; older shells throw
/// instead, which is folded into the same reply.
pub(super) fn build_replica_status_script() -> String {
    r#"
        var s;
        try {
            s = db.adminCommand({ replSetGetStatus: 1 });
        } catch (e) {
            s = { ok: 0, errmsg: String(e) };
        }
        print(EJSON.stringify({
            ok: s.ok,
            errmsg: s.errmsg,
            set: s.set,
            date: s.date,
            members: (s.members || []).map(function (m) {
                return { name: m.name, stateStr: m.stateStr, optimeDate: m.optimeDate };
            })
        }, { relaxed: true }));
    "#
    .to_string()
}

/// Builds the script reading the first document of `local.sources`.
pub(super) fn build_sources_script() -> String {
    r#"
        var src = db.getSiblingDB("local").getCollection("sources").findOne();
        print(EJSON.stringify({ source: src }, { relaxed: true }));
    "#
    .to_string()
}

/// Builds the explain script for `query` on `database.collection`.
pub(super) fn build_explain_script(database: &str, collection: &str, query: &Value) -> String {
    let query_text = serde_json::to_string(query).unwrap_or_else(|_| "{}".to_string());
    format!(
        r#"
        var coll = db.getSiblingDB({database}).getCollection({collection});
        var plan = coll.find(EJSON.parse({query})).explain("executionStats");
        print(EJSON.stringify(plan, {{ relaxed: true }}));
    "#,
        database = js_string(database),
        collection = js_string(collection),
        query = js_string(&query_text),
    )
}

/// Builds the `killOp` script for `opid`.
pub(super) fn build_kill_script(opid: i64) -> String {
    format!(
        "print(EJSON.stringify(db.adminCommand({{ killOp: 1, op: {} }}), {{ relaxed: true }}));",
        opid
    )
}

/// Quotes `text` as a JavaScript string literal.
fn js_string(text: &str) -> String {
    Value::String(text.to_string()).to_string()
}
