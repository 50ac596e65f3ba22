use chrono::{Duration, Utc};
use common::{BookId, UserId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{Book, BorrowRequest, BorrowRequestQuery, BorrowStatus, BorrowTransaction};

fn bench_approve_and_return(c: &mut Criterion) {
    c.bench_function("domain/approve_and_return", |b| {
        b.iter(|| {
            let now = Utc::now();
            let mut book = Book::new("Bench", "Author", 4);
            let mut request = BorrowRequest::open(UserId::new(), book.id, now);
            request
                .approve(UserId::new(), now, now + Duration::days(14))
                .unwrap();
            book.reserve_copy().unwrap();
            let mut loan = BorrowTransaction::issue(&request, now, now + Duration::days(14));
            loan.mark_returned(now).unwrap();
            book.release_copy().unwrap();
        });
    });
}

fn bench_query_matching(c: &mut Criterion) {
    let user = UserId::new();
    let now = Utc::now();
    let requests: Vec<BorrowRequest> = (0..1000)
        .map(|i| {
            let owner = if i % 10 == 0 { user } else { UserId::new() };
            BorrowRequest::open(owner, BookId::new(), now)
        })
        .collect();
    let query = BorrowRequestQuery::new()
        .user(user)
        .status(BorrowStatus::Pending);

    c.bench_function("domain/query_1000_requests", |b| {
        b.iter(|| requests.iter().filter(|r| query.matches(r)).count());
    });
}

criterion_group!(benches, bench_approve_and_return, bench_query_matching);
criterion_main!(benches);
